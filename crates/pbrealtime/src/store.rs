//! Observable in-memory record store.
//!
//! The store holds the ordered records of one collection and is the only
//! shared mutable state in the crate. Every mutation goes through one of its
//! methods, each of which runs under a single mutex, so concurrent writers
//! never interleave and readers never see a half-applied change.
//!
//! Observers subscribe to a broadcast channel of [`StoreChange`]s. Changes are
//! published while the lock is held, so they arrive in application order.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::record::Record;

/// Default capacity of the change notification channel.
pub const DEFAULT_CHANGE_BUFFER: usize = 64;

/// A change applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// The whole contents were replaced.
    Replaced {
        /// Number of records after the replacement.
        len: usize,
    },
    /// A record was appended.
    Inserted {
        /// Position of the new record.
        index: usize,
        /// Id of the new record.
        id: String,
    },
    /// A record was replaced in place.
    Updated {
        /// Position of the record (unchanged).
        index: usize,
        /// Id of the record.
        id: String,
    },
    /// A record was removed.
    Removed {
        /// Position the record occupied before removal.
        index: usize,
        /// Id of the removed record.
        id: String,
    },
}

#[derive(Debug)]
struct Inner {
    records: Vec<Record>,
    changes: broadcast::Sender<StoreChange>,
}

impl Inner {
    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    fn publish(&self, change: StoreChange) {
        trace!(?change, "Store changed");
        // No receivers is fine: nobody is rendering yet.
        let _ = self.changes.send(change);
    }
}

/// Cloneable handle to an ordered, id-keyed record collection.
///
/// All clones share the same contents.
#[derive(Debug, Clone)]
pub struct RecordStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    /// Create an empty store with the default change buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_change_buffer(DEFAULT_CHANGE_BUFFER)
    }

    /// Create an empty store whose change channel holds `capacity` entries.
    ///
    /// Observers that fall further behind receive a lag error and should
    /// re-read [`records`](Self::records).
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_change_buffer(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: Vec::new(),
                changes,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every mutation is a single Vec operation, so a poisoned lock still
        // guards consistent data.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.lock().changes.subscribe()
    }

    /// Replace the whole contents, keeping the given order.
    ///
    /// A duplicate id keeps the position of its first occurrence and the
    /// value of its last one.
    pub fn replace_all(&self, items: impl IntoIterator<Item = Record>) {
        let mut inner = self.lock();
        let mut records: Vec<Record> = Vec::new();
        for item in items {
            match records.iter().position(|r| r.id == item.id) {
                Some(index) => records[index] = item,
                None => records.push(item),
            }
        }
        debug!(len = records.len(), "Replacing store contents");
        inner.records = records;
        let len = inner.records.len();
        inner.publish(StoreChange::Replaced { len });
    }

    /// Insert or replace a record by id.
    ///
    /// An existing record is replaced in place; a new one is appended.
    /// Returns `true` if the record was appended.
    pub fn upsert(&self, record: Record) -> bool {
        let mut inner = self.lock();
        let id = record.id.clone();
        if let Some(index) = inner.position(&id) {
            inner.records[index] = record;
            inner.publish(StoreChange::Updated { index, id });
            false
        } else {
            inner.records.push(record);
            let index = inner.records.len() - 1;
            inner.publish(StoreChange::Inserted { index, id });
            true
        }
    }

    /// Replace a record only if one with the same id is already present.
    ///
    /// Returns `false` (and leaves the store untouched) when the id is absent.
    pub fn replace_existing(&self, record: Record) -> bool {
        let mut inner = self.lock();
        let Some(index) = inner.position(&record.id) else {
            return false;
        };
        let id = record.id.clone();
        inner.records[index] = record;
        inner.publish(StoreChange::Updated { index, id });
        true
    }

    /// Remove the record with the given id.
    ///
    /// Returns `false` if no such record exists.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.lock();
        let Some(index) = inner.position(id) else {
            return false;
        };
        inner.records.remove(index);
        inner.publish(StoreChange::Removed {
            index,
            id: id.to_string(),
        });
        true
    }

    /// Get a copy of the current contents, in order.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.lock().records.clone()
    }

    /// Get a copy of the record with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Record> {
        let inner = self.lock();
        inner.position(id).map(|index| inner.records[index].clone())
    }

    /// Check whether a record with the given id is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.lock().position(id).is_some()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Check if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Run `f` against the current contents while holding the lock.
    pub fn with_records<R>(&self, f: impl FnOnce(&[Record]) -> R) -> R {
        f(&self.lock().records)
    }
}
