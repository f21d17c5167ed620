//! Error reporting hook for failures nobody awaits.
//!
//! Fire-and-forget toggles and per-event realtime decode failures have no
//! caller to return an error to. They are handed to an [`ErrorSink`] instead,
//! which by default just logs them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::Error;

/// Receives errors from background work.
pub trait ErrorSink: Send + Sync + std::fmt::Debug {
    /// Report one error. Must not block.
    fn report(&self, error: Error);
}

/// Shared, type-erased error sink.
pub type SharedSink = Arc<dyn ErrorSink>;

/// Sink that logs every error at `warn` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, error: Error) {
        warn!(error = %error, "Background operation failed");
    }
}

/// Sink that forwards every error to an unbounded channel.
///
/// Errors reported after the receiver is dropped are logged instead.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Error>,
}

impl ChannelSink {
    /// Create a sink and the receiver its errors arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Error>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ErrorSink for ChannelSink {
    fn report(&self, error: Error) {
        if let Err(mpsc::error::SendError(error)) = self.tx.send(error) {
            TracingSink.report(error);
        }
    }
}

/// The default sink: [`TracingSink`].
#[must_use]
pub fn default_sink() -> SharedSink {
    Arc::new(TracingSink)
}
