//! End-to-end tests against an in-process fake backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;

use common::{eventually, FakeBackend};
use pbrealtime::error::{AuthError, FetchError, TransportError};
use pbrealtime::{ChannelSink, Config, Error, Record, SubscriberState, SyncClient};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn login_stores_token_and_user() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    let (client, _errors) = backend.client();

    let session = client.login("ada@example.com", "secret").await.unwrap();

    assert_eq!(session.token, "tok-1");
    assert_eq!(session.user_id, "u1");
    assert_eq!(session.display_name, "Ada");
    assert_eq!(client.session().current_token().as_deref(), Some("tok-1"));

    let logins = backend.requests_to("POST", "/api/collections/users/auth-with-password");
    assert_eq!(logins.len(), 1);
    assert_eq!(
        logins[0].json(),
        json!({"identity": "ada@example.com", "password": "secret"})
    );
}

#[tokio::test]
async fn rejected_login_leaves_client_unauthenticated() {
    let backend = FakeBackend::start().await;
    backend.route(
        "POST",
        "/api/collections/users/auth-with-password",
        401,
        json!({"message": "Failed to authenticate."}),
    );
    let (client, _errors) = backend.client();

    let err = client.login("a@b.com", "x").await.unwrap_err();

    assert!(matches!(
        err,
        Error::Auth(AuthError::InvalidCredentials { status: 401 })
    ));
    assert!(!client.session().is_authenticated());
}

#[tokio::test]
async fn undecodable_login_body_is_a_transport_error() {
    let backend = FakeBackend::start().await;
    backend.route(
        "POST",
        "/api/collections/users/auth-with-password",
        200,
        json!({}),
    );
    let (client, _errors) = backend.client();

    let err = client.login("a@b.com", "x").await.unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::Transport(_))));
    assert!(!client.session().is_authenticated());
}

#[tokio::test]
async fn https_base_url_reaches_the_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    // Accept and hang up: the TLS handshake fails, but only after connecting.
    let accepted = tokio::spawn(async move { listener.accept().await.is_ok() });

    let mut config = Config::default();
    config.server.base_url = format!("https://{addr}");
    let (sink, _errors) = ChannelSink::new();
    let client = SyncClient::from_config(&config, Arc::new(sink)).unwrap();

    let err = client.login("a@b.com", "x").await.unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::Transport(_))));
    assert!(tokio::time::timeout(WAIT, accepted).await.unwrap().unwrap());
}

#[tokio::test]
async fn refresh_seeds_store_with_bearer_token() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.serve_snapshot(json!([{"id": "1", "title": "a", "status": false}]));
    let (client, _errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();

    let snapshot = client.refresh().await.unwrap();

    assert_eq!(snapshot.total_items, 1);
    assert_eq!(client.store().records(), vec![Record::new("1", "a", false)]);
    let fetches = backend.requests_to("GET", "/api/collections/todos/records");
    assert_eq!(fetches[0].header("authorization"), Some("Bearer tok-1"));
}

#[tokio::test]
async fn failed_snapshot_prevents_subscription() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.route(
        "GET",
        "/api/collections/todos/records",
        403,
        json!({"message": "forbidden"}),
    );
    let (mut client, _errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();

    let err = client.start().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Fetch(FetchError::Status { status: 403 })
    ));
    assert!(client.subscription().is_none());
    assert!(backend.requests_to("GET", "/api/realtime").is_empty());
}

#[tokio::test]
async fn undecodable_snapshot_is_a_decode_error() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.route(
        "GET",
        "/api/collections/todos/records",
        200,
        json!({"items": "nope"}),
    );
    let (mut client, _errors) = backend.client();
    client.login("a@b.com", "x").await.unwrap();
    client.store().replace_all(vec![Record::new("1", "kept", false)]);

    let err = client.refresh().await.unwrap_err();
    assert!(matches!(err, Error::Fetch(FetchError::Decode(_))));
    assert_eq!(client.store().records(), vec![Record::new("1", "kept", false)]);

    let err = client.start().await.unwrap_err();
    assert!(matches!(err, Error::Fetch(FetchError::Decode(_))));
    assert!(client.subscription().is_none());
}

#[tokio::test]
async fn toggle_sends_only_the_inverted_flag() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.route(
        "PATCH",
        "/api/collections/todos/records/1",
        200,
        json!({"id": "1", "title": "a", "status": true}),
    );
    let (client, _errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();
    client.store().replace_all(vec![Record::new("1", "a", false)]);

    client.toggle(&Record::new("1", "a", false)).await.unwrap();

    let patches = backend.requests_to("PATCH", "/api/collections/todos/records/1");
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].json(), json!({"status": true}));
    assert_eq!(patches[0].header("authorization"), Some("Bearer tok-1"));
    // Only the echoed realtime event changes the store.
    assert_eq!(client.store().get("1"), Some(Record::new("1", "a", false)));
}

#[tokio::test]
async fn failed_background_toggle_is_reported() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.route(
        "PATCH",
        "/api/collections/todos/records/1",
        404,
        json!({"message": "not found"}),
    );
    let (client, mut errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();
    client.store().replace_all(vec![Record::new("1", "a", false)]);

    let ok = client.toggle_by_id("1").unwrap().await.unwrap();

    assert!(!ok);
    let reported = errors.recv().await.unwrap();
    assert!(matches!(reported, Error::Update(_)));
    assert!(reported.to_string().contains("404"));
}

#[tokio::test]
async fn realtime_create_update_delete_flow() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.serve_snapshot(json!([]));
    backend.route("POST", "/api/realtime", 200, json!({}));
    let (mut client, _errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();

    let mut state = client.start().await.unwrap().watch_state();
    assert!(client.store().is_empty());

    backend.push("PB_CONNECT", &json!({"clientId": "c1"}));
    tokio::time::timeout(WAIT, state.wait_for(SubscriberState::is_subscribed))
        .await
        .unwrap()
        .unwrap();

    let registrations = backend.requests_to("POST", "/api/realtime");
    assert_eq!(registrations.len(), 1);
    assert_eq!(
        registrations[0].json(),
        json!({"clientId": "c1", "subscriptions": ["todos"]})
    );
    assert_eq!(
        registrations[0].header("authorization"),
        Some("Bearer tok-1")
    );

    backend.push(
        "todos",
        &json!({"action": "create", "record": {"id": "1", "title": "a", "status": false}}),
    );
    eventually(|| client.store().len() == 1).await;

    backend.push(
        "todos",
        &json!({"action": "update", "record": {"id": "1", "title": "a", "status": true}}),
    );
    eventually(|| client.store().get("1").is_some_and(|r| r.done)).await;

    backend.push(
        "todos",
        &json!({"action": "delete", "record": {"id": "1", "title": "a", "status": true}}),
    );
    eventually(|| client.store().is_empty()).await;

    assert_eq!(client.stop().await, SubscriberState::Closed);
}

#[tokio::test]
async fn events_before_handshake_are_discarded() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.serve_snapshot(json!([]));
    backend.route("POST", "/api/realtime", 200, json!({}));
    let (mut client, _errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();
    let mut state = client.start().await.unwrap().watch_state();

    backend.push(
        "todos",
        &json!({"action": "create", "record": {"id": "early", "title": "x", "status": false}}),
    );
    backend.push("PB_CONNECT", &json!({"clientId": "c1"}));
    tokio::time::timeout(WAIT, state.wait_for(SubscriberState::is_subscribed))
        .await
        .unwrap()
        .unwrap();
    backend.push(
        "todos",
        &json!({"action": "create", "record": {"id": "late", "title": "y", "status": false}}),
    );

    eventually(|| client.store().contains("late")).await;
    assert!(!client.store().contains("early"));
    client.stop().await;
}

#[tokio::test]
async fn malformed_event_is_reported_and_stream_continues() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.serve_snapshot(json!([]));
    backend.route("POST", "/api/realtime", 200, json!({}));
    let (mut client, mut errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();
    let mut state = client.start().await.unwrap().watch_state();

    backend.push("PB_CONNECT", &json!({"clientId": "c1"}));
    tokio::time::timeout(WAIT, state.wait_for(SubscriberState::is_subscribed))
        .await
        .unwrap()
        .unwrap();
    backend.push_raw("event: todos\ndata: {not json\n\n");
    backend.push(
        "todos",
        &json!({"action": "create", "record": {"id": "1", "title": "a", "status": false}}),
    );

    let reported = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert!(matches!(reported, Error::Decode(_)));
    eventually(|| client.store().contains("1")).await;
    assert!(client.realtime_state().is_subscribed());
    client.stop().await;
}

#[tokio::test]
async fn server_closing_stream_ends_subscription() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.serve_snapshot(json!([{"id": "1", "title": "a", "status": false}]));
    backend.route("POST", "/api/realtime", 200, json!({}));
    let (mut client, _errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();
    client.start().await.unwrap();

    backend.push("PB_CONNECT", &json!({"clientId": "c1"}));
    backend.close_events();

    let handle = client.subscription().unwrap();
    let state = tokio::time::timeout(WAIT, handle.closed()).await.unwrap();
    assert_eq!(state, SubscriberState::Closed);
    assert_eq!(client.store().len(), 1);
}

#[tokio::test]
async fn rejected_stream_errors_subscription() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.serve_snapshot(json!([]));
    backend.route("GET", "/api/realtime", 401, json!({"message": "unauthorized"}));
    let (mut client, mut errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();
    client.start().await.unwrap();

    let handle = client.subscription().unwrap();
    let state = tokio::time::timeout(WAIT, handle.closed()).await.unwrap();

    assert_eq!(
        state,
        SubscriberState::Errored(TransportError::Status { status: 401 })
    );
    let reported = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert!(matches!(reported, Error::Transport(_)));
}

#[tokio::test]
async fn failed_registration_errors_subscription() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.serve_snapshot(json!([]));
    backend.route("POST", "/api/realtime", 403, json!({"message": "forbidden"}));
    let (mut client, _errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();
    client.start().await.unwrap();

    backend.push("PB_CONNECT", &json!({"clientId": "c1"}));
    let handle = client.subscription().unwrap();
    let state = tokio::time::timeout(WAIT, handle.closed()).await.unwrap();

    assert!(matches!(
        state,
        SubscriberState::Errored(TransportError::Register(_))
    ));
}

#[tokio::test]
async fn logout_stops_subscription_and_clears_session() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.serve_snapshot(json!([]));
    backend.route("POST", "/api/realtime", 200, json!({}));
    let (mut client, _errors) = backend.client();
    client.login("ada@example.com", "secret").await.unwrap();
    let mut state = client.start().await.unwrap().watch_state();
    backend.push("PB_CONNECT", &json!({"clientId": "c1"}));
    tokio::time::timeout(WAIT, state.wait_for(SubscriberState::is_subscribed))
        .await
        .unwrap()
        .unwrap();

    client.logout().await;

    assert!(!client.session().is_authenticated());
    assert!(client.subscription().is_none());
    assert!(state.borrow().is_terminal());

    backend.push(
        "todos",
        &json!({"action": "create", "record": {"id": "1", "title": "a", "status": false}}),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.store().is_empty());
}

#[tokio::test]
async fn seeded_list_follows_pushed_changes() {
    let backend = FakeBackend::start().await;
    backend.accept_login("tok-1");
    backend.serve_snapshot(json!([{"id": "1", "title": "Buy milk", "status": false}]));
    backend.route("POST", "/api/realtime", 200, json!({}));
    let (mut client, _errors) = backend.client();
    client.login("a@b.com", "x").await.unwrap();

    let mut state = client.start().await.unwrap().watch_state();
    assert_eq!(
        client.store().records(),
        vec![Record::new("1", "Buy milk", false)]
    );

    backend.push("PB_CONNECT", &json!({"clientId": "c1"}));
    tokio::time::timeout(WAIT, state.wait_for(SubscriberState::is_subscribed))
        .await
        .unwrap()
        .unwrap();

    backend.push(
        "todos",
        &json!({"action": "create", "record": {"id": "2", "title": "New", "status": false}}),
    );
    eventually(|| client.store().len() == 2).await;
    assert_eq!(
        client.store().records(),
        vec![
            Record::new("1", "Buy milk", false),
            Record::new("2", "New", false),
        ]
    );

    backend.push(
        "todos",
        &json!({"action": "update", "record": {"id": "1", "title": "Buy milk", "status": true}}),
    );
    eventually(|| client.store().get("1").is_some_and(|r| r.done)).await;
    assert_eq!(
        client.store().records(),
        vec![
            Record::new("1", "Buy milk", true),
            Record::new("2", "New", false),
        ]
    );

    backend.push(
        "todos",
        &json!({"action": "delete", "record": {"id": "1", "title": "Buy milk", "status": true}}),
    );
    eventually(|| !client.store().contains("1")).await;
    assert_eq!(client.store().records(), vec![Record::new("2", "New", false)]);

    client.logout().await;
}
