//! Root context wiring the session, store, loader, subscriber and sender.
//!
//! [`SyncClient`] owns the lifecycle: it logs in, seeds the store, keeps one
//! realtime subscription running and tears everything down on logout.

use std::sync::Arc;

use tracing::info;

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mutation::MutationSender;
use crate::realtime::{
    RealtimeSubscriber, RealtimeTransport, SubscriberState, SubscriptionHandle,
};
use crate::record::{CollectionSnapshot, Record};
use crate::report::SharedSink;
use crate::session::{Session, SessionHolder};
use crate::snapshot::SnapshotLoader;
use crate::store::RecordStore;

/// A live, realtime-synchronized view of one collection.
#[derive(Debug)]
pub struct SyncClient {
    session: SessionHolder,
    store: RecordStore,
    snapshots: SnapshotLoader,
    subscriber: RealtimeSubscriber,
    mutations: MutationSender,
    subscription: Option<SubscriptionHandle>,
}

impl SyncClient {
    /// Build a client from configuration, speaking HTTP to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn from_config(config: &Config, sink: SharedSink) -> Result<Self> {
        config.validate()?;
        let api = ApiClient::from_config(config)?;
        let store = RecordStore::with_change_buffer(config.realtime.change_buffer);
        let subscriber = RealtimeSubscriber::over_http(
            api.clone(),
            store.clone(),
            config.server.collection.clone(),
            Arc::clone(&sink),
        );
        Ok(Self::assemble(
            api,
            &config.server.auth_collection,
            &config.server.collection,
            store,
            subscriber,
            sink,
        ))
    }

    /// Build a client whose realtime channel uses a custom transport.
    #[must_use]
    pub fn with_transport(
        api: ApiClient,
        auth_collection: &str,
        collection: &str,
        transport: Arc<dyn RealtimeTransport>,
        sink: SharedSink,
    ) -> Self {
        let store = RecordStore::new();
        let subscriber =
            RealtimeSubscriber::new(transport, store.clone(), collection, Arc::clone(&sink));
        Self::assemble(api, auth_collection, collection, store, subscriber, sink)
    }

    fn assemble(
        api: ApiClient,
        auth_collection: &str,
        collection: &str,
        store: RecordStore,
        subscriber: RealtimeSubscriber,
        sink: SharedSink,
    ) -> Self {
        let session = SessionHolder::new(api.clone(), auth_collection);
        Self {
            snapshots: SnapshotLoader::new(api.clone(), collection),
            mutations: MutationSender::new(api, session.clone(), collection, sink),
            session,
            store,
            subscriber,
            subscription: None,
        }
    }

    /// The session handle shared with every component.
    #[must_use]
    pub fn session(&self) -> &SessionHolder {
        &self.session
    }

    /// The synchronized records.
    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Name of the synchronized collection.
    #[must_use]
    pub fn collection(&self) -> &str {
        self.subscriber.collection()
    }

    /// The active subscription, if started.
    #[must_use]
    pub fn subscription(&self) -> Option<&SubscriptionHandle> {
        self.subscription.as_ref()
    }

    /// State of the realtime channel.
    #[must_use]
    pub fn realtime_state(&self) -> SubscriberState {
        self.subscription
            .as_ref()
            .map_or(SubscriberState::Disconnected, SubscriptionHandle::state)
    }

    /// Log in with a password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the login is rejected or fails.
    pub async fn login(&self, identity: &str, secret: &str) -> Result<Session> {
        Ok(self.session.login(identity, secret).await?)
    }

    /// Replace the store contents with a fresh snapshot.
    ///
    /// Does not touch the realtime subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] without a session and
    /// [`Error::Fetch`] if the snapshot cannot be loaded.
    pub async fn refresh(&self) -> Result<CollectionSnapshot> {
        let token = self.session.require_token()?;
        let snapshot = self.snapshots.fetch(&token).await?;
        self.store.replace_all(snapshot.items.iter().cloned());
        Ok(snapshot)
    }

    /// Seed the store from a snapshot, then start the realtime subscription.
    ///
    /// A subscription that is already running is stopped first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] without a session and
    /// [`Error::Fetch`] if the snapshot cannot be loaded; in both cases no
    /// subscription is started.
    pub async fn start(&mut self) -> Result<&SubscriptionHandle> {
        let token = self.session.require_token()?;
        self.stop().await;

        self.snapshots.seed(&token, &self.store).await?;
        info!(collection = %self.subscriber.collection(), "Starting realtime subscription");
        Ok(self.subscription.insert(self.subscriber.start(token)))
    }

    /// Toggle a record and wait for the request to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Update`] if the request fails.
    pub async fn toggle(&self, record: &Record) -> Result<()> {
        Ok(self.mutations.toggle_done(record).await?)
    }

    /// Toggle the record with `id` in the background.
    ///
    /// Failures go to the error sink.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownRecord`] if no record with `id` is held.
    pub fn toggle_by_id(&self, id: &str) -> Result<tokio::task::JoinHandle<bool>> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| Error::UnknownRecord { id: id.to_string() })?;
        Ok(self.mutations.spawn_toggle(record))
    }

    /// Stop the realtime subscription, if any.
    pub async fn stop(&mut self) -> SubscriberState {
        match self.subscription.take() {
            Some(handle) => handle.stop().await,
            None => SubscriberState::Disconnected,
        }
    }

    /// Stop the subscription and drop the session.
    ///
    /// The store keeps its last contents.
    pub async fn logout(&mut self) {
        self.stop().await;
        self.session.logout();
    }
}
