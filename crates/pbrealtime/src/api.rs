//! HTTP plumbing shared by every component that talks to the backend.
//!
//! [`ApiClient`] owns the connection pool and knows how the backend lays out
//! its endpoints. It does not hold credentials: callers pass the bearer token
//! from their [`SessionHolder`](crate::session::SessionHolder) per request.

use reqwest::{Method, RequestBuilder};
use url::Url;

use crate::config::Config;
use crate::error::Result;

/// Cloneable HTTP client bound to one backend base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// Create a client for the backend at `base`.
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    /// Create a client from the `[server]` section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured base URL is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.base_url()?))
    }

    /// The backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build `{base}/api/{segments...}`, percent-encoding each segment.
    #[must_use]
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        // Only cannot-be-a-base URLs reject path edits; config validation
        // restricts the base to http(s).
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    /// `POST` target for password login against an auth collection.
    #[must_use]
    pub fn auth_url(&self, auth_collection: &str) -> Url {
        self.endpoint(&["collections", auth_collection, "auth-with-password"])
    }

    /// `GET` target listing the records of a collection.
    #[must_use]
    pub fn records_url(&self, collection: &str) -> Url {
        self.endpoint(&["collections", collection, "records"])
    }

    /// `PATCH` target for a single record.
    #[must_use]
    pub fn record_url(&self, collection: &str, id: &str) -> Url {
        self.endpoint(&["collections", collection, "records", id])
    }

    /// Realtime event stream (`GET`) and subscription registration (`POST`).
    #[must_use]
    pub fn realtime_url(&self) -> Url {
        self.endpoint(&["realtime"])
    }

    /// Start an unauthenticated request.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Start a request carrying `Authorization: Bearer <token>`.
    pub(crate) fn authorized(&self, method: Method, url: Url, token: &str) -> RequestBuilder {
        self.request(method, url).bearer_auth(token)
    }
}
