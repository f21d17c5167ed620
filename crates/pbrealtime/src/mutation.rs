//! Mutation sender: partial updates that the realtime channel echoes back.
//!
//! A toggle never touches the local store. If the request succeeds the
//! server pushes an `update` event and the subscriber applies it; if it
//! fails the store keeps showing the old value.

use reqwest::Method;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::error::UpdateError;
use crate::record::Record;
use crate::report::SharedSink;
use crate::session::SessionHolder;

#[derive(Debug, Serialize)]
struct StatusPatch {
    status: bool,
}

/// Sends record updates for one collection.
#[derive(Debug, Clone)]
pub struct MutationSender {
    api: ApiClient,
    session: SessionHolder,
    collection: String,
    sink: SharedSink,
}

impl MutationSender {
    /// Create a sender authenticating through `session`.
    #[must_use]
    pub fn new(
        api: ApiClient,
        session: SessionHolder,
        collection: impl Into<String>,
        sink: SharedSink,
    ) -> Self {
        Self {
            api,
            session,
            collection: collection.into(),
            sink,
        }
    }

    /// Ask the server to invert `record.done`.
    ///
    /// Only the boolean field is sent.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::NotAuthenticated`] without a session,
    /// [`UpdateError::Status`] for a non-success status, and
    /// [`UpdateError::Transport`] if the request cannot be sent.
    pub async fn toggle_done(&self, record: &Record) -> Result<(), UpdateError> {
        let token = self
            .session
            .current_token()
            .ok_or(UpdateError::NotAuthenticated)?;
        let url = self.api.record_url(&self.collection, &record.id);
        let patch = StatusPatch {
            status: !record.done,
        };
        debug!(id = %record.id, status = patch.status, "Sending toggle");

        let response = self
            .api
            .authorized(Method::PATCH, url, &token)
            .json(&patch)
            .send()
            .await
            .map_err(|e| UpdateError::Transport {
                id: record.id.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Status {
                id: record.id.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Toggle on a separate task, reporting failure to the error sink.
    ///
    /// The task resolves to `true` if the request succeeded.
    pub fn spawn_toggle(&self, record: Record) -> JoinHandle<bool> {
        let this = self.clone();
        tokio::spawn(async move {
            match this.toggle_done(&record).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Toggle failed");
                    this.sink.report(e.into());
                    false
                }
            }
        })
    }
}
