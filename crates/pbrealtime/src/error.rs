//! Error types for pbrealtime.
//!
//! Each component reports failures through its own error type so callers can
//! tell a rejected login apart from a dropped realtime connection. The
//! top-level [`Error`] wraps all of them for code that just wants `?`.

use thiserror::Error;

/// The main error type for pbrealtime operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Component Errors ===
    /// Login failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The collection snapshot could not be loaded.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A realtime payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The realtime connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A record update request failed.
    #[error(transparent)]
    Update(#[from] UpdateError),

    // === Session Errors ===
    /// An operation needed a bearer token but nobody is logged in.
    #[error("no auth token available")]
    NotAuthenticated,

    /// No record with this id is held in the store.
    #[error("unknown record: {id}")]
    UnknownRecord {
        /// The id that was looked up.
        id: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for pbrealtime operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Check if this error means nobody is logged in.
    #[must_use]
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }
}

/// Errors from the password-grant login exchange.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The backend answered with a non-success status.
    #[error("invalid credentials (HTTP {status})")]
    InvalidCredentials {
        /// HTTP status code returned by the backend.
        status: u16,
    },

    /// The request could not be sent or the response body was unreadable.
    #[error("login request failed: {0}")]
    Transport(String),
}

impl AuthError {
    /// Check if the backend rejected the credentials.
    #[must_use]
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, Self::InvalidCredentials { .. })
    }
}

/// Errors from loading the collection snapshot.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The list endpoint answered with a non-success status.
    #[error("snapshot request returned HTTP {status}")]
    Status {
        /// HTTP status code returned by the backend.
        status: u16,
    },

    /// The request could not be sent or the body could not be read.
    #[error("snapshot request failed: {0}")]
    Transport(String),

    /// The response body was not a valid collection page.
    #[error("failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A realtime payload that could not be decoded.
///
/// Decode errors are per-event: the connection stays open.
#[derive(Error, Debug)]
#[error("failed to decode {event} event: {source}")]
pub struct DecodeError {
    /// Name of the server-sent event that carried the payload.
    pub event: String,
    /// The raw data field, kept for diagnostics.
    pub data: String,
    /// The underlying JSON error.
    #[source]
    pub source: serde_json::Error,
}

impl DecodeError {
    /// Create a decode error for the given event.
    #[must_use]
    pub fn new(
        event: impl Into<String>,
        data: impl Into<String>,
        source: serde_json::Error,
    ) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            source,
        }
    }
}

/// Connection-level failures of the realtime channel.
///
/// Terminal for the connection instance that produced them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The event stream could not be opened.
    #[error("failed to open realtime stream: {0}")]
    Connect(String),

    /// The realtime endpoint answered with a non-success status.
    #[error("realtime endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code returned by the backend.
        status: u16,
    },

    /// Reading from the open stream failed.
    #[error("realtime stream read failed: {0}")]
    Read(String),

    /// Registering the subscription for the connection failed.
    #[error("subscription registration failed: {0}")]
    Register(String),
}

/// Errors from the record update request.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The update endpoint answered with a non-success status.
    #[error("update of record {id} returned HTTP {status}")]
    Status {
        /// Id of the record that was being updated.
        id: String,
        /// HTTP status code returned by the backend.
        status: u16,
    },

    /// The request could not be sent.
    #[error("update of record {id} failed: {message}")]
    Transport {
        /// Id of the record that was being updated.
        id: String,
        /// Description of what went wrong.
        message: String,
    },

    /// No session was available to authenticate the request.
    #[error("no auth token available")]
    NotAuthenticated,
}
