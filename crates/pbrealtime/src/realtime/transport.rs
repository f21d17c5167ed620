//! The connection underneath the realtime subscriber.
//!
//! [`RealtimeTransport`] is the seam between the subscriber's state machine
//! and the network. [`HttpTransport`] is the real implementation; tests drive
//! the subscriber with scripted transports instead.

use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::Method;
use tracing::debug;

use super::envelope::Registration;
use super::sse::{self, SseEvent};
use crate::api::ApiClient;
use crate::error::TransportError;

/// Lazy, possibly infinite sequence of events from one connection.
///
/// Dropping the stream closes the connection.
pub type EventStream = BoxStream<'static, Result<SseEvent, TransportError>>;

/// Opens realtime connections and registers subscriptions on them.
#[async_trait::async_trait]
pub trait RealtimeTransport: Send + Sync + std::fmt::Debug {
    /// Open the event stream, authenticated with `token`.
    ///
    /// Returning `Ok` means the transport is open; no application data has
    /// necessarily arrived yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened.
    async fn connect(&self, token: &str) -> Result<EventStream, TransportError>;

    /// Register interest in topics for the connection identified by
    /// `registration.client_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration request fails.
    async fn register(&self, token: &str, registration: &Registration)
        -> Result<(), TransportError>;
}

/// Server-sent events over HTTP via `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    api: ApiClient,
}

impl HttpTransport {
    /// Create a transport for the backend behind `api`.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl RealtimeTransport for HttpTransport {
    async fn connect(&self, token: &str) -> Result<EventStream, TransportError> {
        let url = self.api.realtime_url();
        debug!(%url, "Opening realtime stream");

        let response = self
            .api
            .authorized(Method::GET, url, token)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        Ok(sse::decode_stream(response.bytes_stream()).boxed())
    }

    async fn register(
        &self,
        token: &str,
        registration: &Registration,
    ) -> Result<(), TransportError> {
        let url = self.api.realtime_url();
        debug!(
            %url,
            client_id = %registration.client_id,
            topics = ?registration.subscriptions,
            "Registering subscription"
        );

        let response = self
            .api
            .authorized(Method::POST, url, token)
            .json(registration)
            .send()
            .await
            .map_err(|e| TransportError::Register(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Register(format!("HTTP {}", status.as_u16())));
        }
        Ok(())
    }
}
