//! Realtime subscriber: keeps a [`RecordStore`] in step with server pushes.
//!
//! The subscriber runs one tokio task per connection:
//!
//! ```text
//!   Disconnected ─start()─▶ Connecting ─open─▶ AwaitingHandshake
//!        PB_CONNECT{clientId} + POST registration ─▶ Subscribed
//!   any ─stream end / stop()─▶ Closed      any ─transport error─▶ Errored
//! ```
//!
//! Events are applied one at a time, in arrival order, by that task alone.
//! Nothing is applied until the handshake's client id has been registered;
//! earlier non-control events are discarded. Each application happens inside
//! a [`DispatchGate`], which [`SubscriptionHandle::stop`] closes before it
//! returns, so no mutation can land after `stop()`.

pub mod envelope;
pub mod sse;
pub mod transport;

use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

pub use envelope::{Applied, Envelope, Handshake, Registration, CONNECT_EVENT};
pub use sse::{SseDecoder, SseEvent};
pub use transport::{EventStream, HttpTransport, RealtimeTransport};

use crate::api::ApiClient;
use crate::error::TransportError;
use crate::report::SharedSink;
use crate::store::RecordStore;

/// Lifecycle of one realtime connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberState {
    /// Not started.
    Disconnected,
    /// Opening the event stream.
    Connecting,
    /// Stream open, waiting for the connect handshake.
    AwaitingHandshake,
    /// Registered; events are being applied.
    Subscribed {
        /// Connection id issued by the server.
        client_id: String,
    },
    /// Stopped or ended normally. Terminal.
    Closed,
    /// Ended by a transport failure. Terminal.
    Errored(TransportError),
}

impl SubscriberState {
    /// Check whether the connection has ended.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored(_))
    }

    /// Check whether events are being applied.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed { .. })
    }
}

impl std::fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::AwaitingHandshake => write!(f, "awaiting handshake"),
            Self::Subscribed { client_id } => write!(f, "subscribed ({client_id})"),
            Self::Closed => write!(f, "closed"),
            Self::Errored(e) => write!(f, "errored: {e}"),
        }
    }
}

/// Guards store mutations against a concurrent stop.
///
/// Mutations run while holding the gate's lock; closing takes the same lock,
/// so once [`close`](Self::close) returns every in-flight mutation has either
/// finished or will never start.
#[derive(Debug)]
struct DispatchGate {
    open: Mutex<bool>,
}

impl DispatchGate {
    fn new() -> Self {
        Self {
            open: Mutex::new(true),
        }
    }

    fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        open.then(f)
    }

    fn close(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

enum Outcome {
    Ended,
    Stopped,
    Failed(TransportError),
}

/// Applies server pushes for one collection to a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct RealtimeSubscriber {
    transport: Arc<dyn RealtimeTransport>,
    store: RecordStore,
    collection: String,
    sink: SharedSink,
}

impl RealtimeSubscriber {
    /// Create a subscriber using a custom transport.
    #[must_use]
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        store: RecordStore,
        collection: impl Into<String>,
        sink: SharedSink,
    ) -> Self {
        Self {
            transport,
            store,
            collection: collection.into(),
            sink,
        }
    }

    /// Create a subscriber speaking server-sent events to the backend.
    #[must_use]
    pub fn over_http(
        api: ApiClient,
        store: RecordStore,
        collection: impl Into<String>,
        sink: SharedSink,
    ) -> Self {
        Self::new(Arc::new(HttpTransport::new(api)), store, collection, sink)
    }

    /// The collection this subscriber registers for.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Open a connection and start applying events.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle also stops the connection, though without waiting for it.
    #[must_use = "dropping the handle stops the subscription"]
    pub fn start(&self, token: impl Into<String>) -> SubscriptionHandle {
        let token = token.into();
        let gate = Arc::new(DispatchGate::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SubscriberState::Disconnected);

        let this = self.clone();
        let task_gate = Arc::clone(&gate);
        let task = tokio::spawn(async move {
            this.run(token, task_gate, stop_rx, state_tx).await;
        });

        SubscriptionHandle {
            gate,
            stop_tx,
            state_rx,
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    async fn run(
        self,
        token: String,
        gate: Arc<DispatchGate>,
        mut stop_rx: watch::Receiver<bool>,
        state: watch::Sender<SubscriberState>,
    ) {
        let outcome = tokio::select! {
            biased;
            // Err means the handle was dropped, which also stops us.
            _ = stop_rx.wait_for(|stopped| *stopped) => Outcome::Stopped,
            outcome = self.connection(&token, &gate, &state) => outcome,
        };

        let final_state = match outcome {
            Outcome::Ended => {
                info!(collection = %self.collection, "Realtime stream ended");
                SubscriberState::Closed
            }
            Outcome::Stopped => {
                debug!(collection = %self.collection, "Realtime subscriber stopped");
                SubscriberState::Closed
            }
            Outcome::Failed(e) => {
                warn!(collection = %self.collection, error = %e, "Realtime connection failed");
                self.sink.report(e.clone().into());
                SubscriberState::Errored(e)
            }
        };
        state.send_replace(final_state);
    }

    async fn connection(
        &self,
        token: &str,
        gate: &DispatchGate,
        state: &watch::Sender<SubscriberState>,
    ) -> Outcome {
        state.send_replace(SubscriberState::Connecting);
        let mut events = match self.transport.connect(token).await {
            Ok(events) => events,
            Err(e) => return Outcome::Failed(e),
        };
        state.send_replace(SubscriberState::AwaitingHandshake);
        debug!(collection = %self.collection, "Realtime stream open");

        let mut client_id: Option<String> = None;
        while let Some(next) = events.next().await {
            let event = match next {
                Ok(event) => event,
                Err(e) => return Outcome::Failed(e),
            };
            trace!(event = %event.event, data = %event.data, "Realtime event");

            if event.event == CONNECT_EVENT {
                let handshake = match Handshake::decode(&event.data) {
                    Ok(handshake) => handshake,
                    Err(e) => {
                        warn!(error = %e, "Malformed connect handshake");
                        self.sink.report(e.into());
                        continue;
                    }
                };
                if let Some(previous) = &client_id {
                    info!(
                        %previous,
                        client_id = %handshake.client_id,
                        "Handshake repeated, registering again"
                    );
                }
                let registration = Registration::for_collection(
                    handshake.client_id.clone(),
                    self.collection.clone(),
                );
                if let Err(e) = self.transport.register(token, &registration).await {
                    return Outcome::Failed(e);
                }
                info!(
                    collection = %self.collection,
                    client_id = %handshake.client_id,
                    "Realtime subscription registered"
                );
                state.send_replace(SubscriberState::Subscribed {
                    client_id: handshake.client_id.clone(),
                });
                client_id = Some(handshake.client_id);
                continue;
            }

            if client_id.is_none() {
                debug!(event = %event.event, "Discarding event received before handshake");
                continue;
            }

            let envelope = match Envelope::decode(&event.event, &event.data) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "Malformed realtime event");
                    self.sink.report(e.into());
                    continue;
                }
            };
            let action = envelope.action().to_string();
            let id = envelope.record_id().map(str::to_string);
            match gate.run(|| envelope.apply(&self.store)) {
                Some(applied) if applied.changed_store() => {
                    debug!(%action, id = ?id, ?applied, "Applied realtime event");
                }
                Some(applied) => {
                    debug!(%action, id = ?id, ?applied, "Realtime event left store unchanged");
                }
                None => return Outcome::Stopped,
            }
        }
        Outcome::Ended
    }
}

/// Control handle for a running subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    gate: Arc<DispatchGate>,
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<SubscriberState>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionHandle {
    /// The current state.
    #[must_use]
    pub fn state(&self) -> SubscriberState {
        self.state_rx.borrow().clone()
    }

    /// A receiver notified on every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SubscriberState> {
        self.state_rx.clone()
    }

    /// Wait until the state satisfies `predicate`, returning that state.
    ///
    /// Returns the last state if the subscription task is gone first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SubscriberState) -> bool,
    ) -> SubscriberState {
        let mut rx = self.state_rx.clone();
        let reached = match rx.wait_for(predicate).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        reached.unwrap_or_else(|| self.state())
    }

    /// Wait until the connection reaches a terminal state.
    pub async fn closed(&self) -> SubscriberState {
        self.wait_for(SubscriberState::is_terminal).await
    }

    /// Stop the subscription.
    ///
    /// Safe to call in any state and more than once. When this returns no
    /// further event will be applied to the store and the connection has
    /// been released.
    pub async fn stop(&self) -> SubscriberState {
        self.gate.close();
        self.stop_tx.send_replace(true);

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Realtime task did not finish cleanly");
            }
        }
        self.state()
    }
}
