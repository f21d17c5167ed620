//! Minimal in-process HTTP backend for integration tests.
//!
//! Speaks just enough HTTP/1.1 for reqwest: one request per connection,
//! `Connection: close` on every response. Routes are canned JSON replies;
//! `GET /api/realtime` without a route becomes a server-sent event stream fed
//! by [`FakeBackend::push`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use pbrealtime::{ApiClient, ChannelSink, Config, Error, SyncClient};

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

type Routes = HashMap<(String, String), (u16, Value)>;

#[derive(Debug)]
struct Shared {
    routes: Mutex<Routes>,
    requests: Mutex<Vec<Request>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

/// A fake PocketBase listening on an ephemeral port.
#[derive(Debug)]
pub struct FakeBackend {
    addr: SocketAddr,
    shared: Arc<Shared>,
    events_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            events: Mutex::new(Some(events_rx)),
        });

        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&accept_shared)));
            }
        });

        Self {
            addr,
            shared,
            events_tx: Mutex::new(Some(events_tx)),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer `method path` with `status` and a JSON body.
    pub fn route(&self, method: &str, path: &str, status: u16, body: Value) {
        self.shared
            .routes
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body));
    }

    /// Accept the standard password login for `users`.
    pub fn accept_login(&self, token: &str) {
        self.route(
            "POST",
            "/api/collections/users/auth-with-password",
            200,
            serde_json::json!({
                "token": token,
                "record": {"id": "u1", "email": "ada@example.com", "name": "Ada"}
            }),
        );
    }

    /// Serve `items` as the one-page `todos` snapshot.
    pub fn serve_snapshot(&self, items: Value) {
        let count = items.as_array().map_or(0, Vec::len);
        self.route(
            "GET",
            "/api/collections/todos/records",
            200,
            serde_json::json!({
                "page": 1,
                "perPage": 30,
                "totalItems": count,
                "totalPages": 1,
                "items": items,
            }),
        );
    }

    /// Send one server-sent event on the realtime stream.
    pub fn push(&self, event: &str, data: &Value) {
        let frame = format!("event: {event}\ndata: {data}\n\n");
        if let Some(tx) = self.events_tx.lock().unwrap().as_ref() {
            let _ = tx.send(frame);
        }
    }

    /// Send a raw frame on the realtime stream.
    pub fn push_raw(&self, frame: &str) {
        if let Some(tx) = self.events_tx.lock().unwrap().as_ref() {
            let _ = tx.send(frame.to_string());
        }
    }

    /// End the realtime stream.
    pub fn close_events(&self) {
        self.events_tx.lock().unwrap().take();
    }

    pub fn requests(&self) -> Vec<Request> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    /// A client for this backend reporting background errors to a channel.
    pub fn client(&self) -> (SyncClient, mpsc::UnboundedReceiver<Error>) {
        let mut config = Config::default();
        config.server.base_url = self.base_url();
        let (sink, errors) = ChannelSink::new();
        let client = SyncClient::from_config(&config, Arc::new(sink)).expect("valid config");
        (client, errors)
    }

    pub fn api(&self) -> ApiClient {
        ApiClient::new(self.base_url().parse().expect("valid url"))
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn serve(mut stream: TcpStream, shared: Arc<Shared>) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    let key = (request.method.clone(), request.path.clone());
    shared.requests.lock().unwrap().push(request);

    let canned = shared.routes.lock().unwrap().get(&key).cloned();
    match canned {
        Some((status, body)) => {
            let body = body.to_string();
            let head = format!(
                "HTTP/1.1 {status} {}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n",
                reason(status),
                body.len()
            );
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(body.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        None if key.0 == "GET" && key.1 == "/api/realtime" => {
            let events = shared.events.lock().unwrap().take();
            match events {
                Some(events) => stream_events(stream, events).await,
                None => not_found(stream).await,
            }
        }
        None => not_found(stream).await,
    }
}

async fn stream_events(mut stream: TcpStream, mut events: mpsc::UnboundedReceiver<String>) {
    let head = "HTTP/1.1 200 OK\r\n\
                Content-Type: text/event-stream\r\n\
                Cache-Control: no-cache\r\n\
                Connection: close\r\n\r\n";
    if stream.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let _ = stream.flush().await;
    while let Some(frame) = events.recv().await {
        if stream.write_all(frame.as_bytes()).await.is_err() {
            return;
        }
        let _ = stream.flush().await;
    }
    let _ = stream.shutdown().await;
}

async fn not_found(mut stream: TcpStream) {
    let body = r#"{"message":"not found"}"#;
    let head = format!(
        "HTTP/1.1 404 Not Found\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(body.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Status",
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    let length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(Request {
        method,
        path,
        headers,
        body,
    })
}
