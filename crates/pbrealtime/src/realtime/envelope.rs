//! Realtime payloads: the connect handshake, the subscription registration
//! and the per-change envelope.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::record::Record;
use crate::store::RecordStore;

/// Name of the reserved control event carrying the connection id.
pub const CONNECT_EVENT: &str = "PB_CONNECT";

/// Payload of the [`CONNECT_EVENT`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Connection id required to register subscriptions.
    pub client_id: String,
}

impl Handshake {
    /// Decode a handshake from event data.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the data is not `{"clientId": ...}`.
    pub fn decode(data: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(data).map_err(|e| DecodeError::new(CONNECT_EVENT, data, e))
    }
}

/// Body of the subscription registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Connection id from the handshake.
    pub client_id: String,
    /// Topics to receive events for.
    pub subscriptions: Vec<String>,
}

impl Registration {
    /// Register `client_id` for a single collection.
    #[must_use]
    pub fn for_collection(client_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            subscriptions: vec![collection.into()],
        }
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    action: String,
    #[serde(default)]
    record: Option<Record>,
}

/// A decoded change pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// A record was created.
    Create(Record),
    /// A record was updated.
    Update(Record),
    /// A record was deleted.
    Delete(Record),
    /// An action this client does not know. Ignored.
    Unknown {
        /// The action string as received.
        action: String,
    },
}

/// What applying an [`Envelope`] did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A record was appended.
    Inserted,
    /// A record was replaced in place.
    Updated,
    /// An update named an id the store does not hold; nothing changed.
    UpdateDropped,
    /// A record was removed.
    Removed,
    /// A delete named an id the store does not hold; nothing changed.
    DeleteMissed,
    /// The action was unknown; nothing changed.
    Ignored,
}

impl Applied {
    /// Check whether the store was modified.
    #[must_use]
    pub fn changed_store(self) -> bool {
        matches!(self, Self::Inserted | Self::Updated | Self::Removed)
    }
}

impl Envelope {
    /// Decode an envelope from the data of the event named `event`.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the data is not an envelope, or if a
    /// known action arrives without a record.
    pub fn decode(event: &str, data: &str) -> Result<Self, DecodeError> {
        let raw: RawEnvelope =
            serde_json::from_str(data).map_err(|e| DecodeError::new(event, data, e))?;

        let known = |record: Option<Record>| {
            record.ok_or_else(|| {
                DecodeError::new(event, data, serde::de::Error::missing_field("record"))
            })
        };
        Ok(match raw.action.as_str() {
            "create" => Self::Create(known(raw.record)?),
            "update" => Self::Update(known(raw.record)?),
            "delete" => Self::Delete(known(raw.record)?),
            _ => Self::Unknown { action: raw.action },
        })
    }

    /// The action name.
    #[must_use]
    pub fn action(&self) -> &str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::Unknown { action } => action,
        }
    }

    /// The id of the affected record, if the action is known.
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Self::Create(record) | Self::Update(record) | Self::Delete(record) => {
                Some(&record.id)
            }
            Self::Unknown { .. } => None,
        }
    }

    /// Apply this change to the store.
    ///
    /// - `create` upserts, so a repeated create updates in place.
    /// - `update` only replaces a record that is already present.
    /// - `delete` removes the record if present.
    pub fn apply(self, store: &RecordStore) -> Applied {
        match self {
            Self::Create(record) => {
                if store.upsert(record) {
                    Applied::Inserted
                } else {
                    Applied::Updated
                }
            }
            Self::Update(record) => {
                if store.replace_existing(record) {
                    Applied::Updated
                } else {
                    Applied::UpdateDropped
                }
            }
            Self::Delete(record) => {
                if store.remove(&record.id) {
                    Applied::Removed
                } else {
                    Applied::DeleteMissed
                }
            }
            Self::Unknown { .. } => Applied::Ignored,
        }
    }
}
