//! One-shot loader for the current state of a collection.

use reqwest::Method;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::FetchError;
use crate::record::CollectionSnapshot;
use crate::store::RecordStore;

/// Fetches the first page of a collection to seed a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    api: ApiClient,
    collection: String,
}

impl SnapshotLoader {
    /// Create a loader for `collection`.
    #[must_use]
    pub fn new(api: ApiClient, collection: impl Into<String>) -> Self {
        Self {
            api,
            collection: collection.into(),
        }
    }

    /// Fetch the current collection page.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Status`] for a non-success status,
    /// [`FetchError::Transport`] if the request or body read fails, and
    /// [`FetchError::Decode`] if the body is not a collection page.
    pub async fn fetch(&self, token: &str) -> Result<CollectionSnapshot, FetchError> {
        let url = self.api.records_url(&self.collection);
        debug!(%url, "Fetching collection snapshot");

        let response = self
            .api
            .authorized(Method::GET, url, token)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let snapshot: CollectionSnapshot =
            serde_json::from_str(&text).map_err(FetchError::Decode)?;

        if snapshot.is_truncated() {
            warn!(
                collection = %self.collection,
                loaded = snapshot.items.len(),
                total = snapshot.total_items,
                "Collection has more than one page; only the first is loaded"
            );
        }
        Ok(snapshot)
    }

    /// Fetch the collection and replace the store contents with it.
    ///
    /// Returns the number of records loaded. The store is left untouched on
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns any error from [`fetch`](Self::fetch).
    pub async fn seed(&self, token: &str, store: &RecordStore) -> Result<usize, FetchError> {
        let snapshot = self.fetch(token).await?;
        let count = snapshot.items.len();
        store.replace_all(snapshot.items);
        info!(collection = %self.collection, count, "Seeded record store");
        Ok(count)
    }
}
