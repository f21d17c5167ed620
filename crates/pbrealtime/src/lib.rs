//! `pbrealtime` - Realtime-synchronized record collections for PocketBase-style backends
//!
//! This library logs in with a password grant, seeds an in-memory store from a
//! collection snapshot, and keeps it current by applying server-sent
//! create/update/delete events. Toggling a record's done flag is sent as a
//! patch; the store only changes when the server echoes the update back.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod mutation;
pub mod realtime;
pub mod record;
pub mod report;
pub mod session;
pub mod snapshot;
pub mod store;

pub use api::ApiClient;
pub use client::SyncClient;
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use mutation::MutationSender;
pub use realtime::{RealtimeSubscriber, SubscriberState, SubscriptionHandle};
pub use record::{CollectionSnapshot, Record};
pub use report::{ChannelSink, ErrorSink, SharedSink, TracingSink};
pub use session::{Session, SessionHolder};
pub use snapshot::SnapshotLoader;
pub use store::{RecordStore, StoreChange};
