//! Test helpers for integration tests.
//!
//! Provides an in-memory board service (HTTP API plus event socket hub), a
//! memory-backed file store, and participant helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use corkboard::realtime::ConnectionState;
use corkboard::{
    BoardClient, BoardError, Channel, Config, ContentItem, Conversation, EncryptedFileRef,
    EncryptedFiles, RealtimeChannel,
};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest add request the mock service accepts.
pub const MAX_ADD_BATCH: usize = 150;

struct SocketEntry {
    bindings: Vec<String>,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Store {
    channels: Vec<Channel>,
    contents: HashMap<String, Vec<ContentItem>>,
}

struct MockState {
    addr: SocketAddr,
    store: Mutex<Store>,
    registrations: Mutex<HashMap<String, Vec<String>>>,
    sockets: Mutex<HashMap<u64, SocketEntry>>,
    next_socket: AtomicU64,
    add_requests: AtomicUsize,
    published: AtomicUsize,
    acks: AtomicUsize,
    relative_links: AtomicBool,
}

impl MockState {
    fn base_url(&self) -> String {
        format!("http://{}/board/api/v1/", self.addr)
    }

    /// Prefix for `Link` targets: absolute, or root-relative when enabled.
    fn link_base(&self) -> String {
        if self.relative_links.load(Ordering::SeqCst) {
            "/board/api/v1/".to_string()
        } else {
            self.base_url()
        }
    }
}

/// In-memory board service bound to an ephemeral local port.
pub struct MockBoardService {
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockBoardService {
    /// Bind and start serving.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockState {
            addr,
            store: Mutex::new(Store::default()),
            registrations: Mutex::new(HashMap::new()),
            sockets: Mutex::new(HashMap::new()),
            next_socket: AtomicU64::new(1),
            add_requests: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
            acks: AtomicUsize::new(0),
            relative_links: AtomicBool::new(false),
        });

        let api = Router::new()
            .route("/ping", get(ping))
            .route("/channels", post(create_channel).get(list_channels))
            .route("/channels/:channel_id", get(get_channel))
            .route(
                "/channels/:channel_id/contents",
                post(add_contents)
                    .get(list_contents)
                    .delete(delete_all_contents),
            )
            .route(
                "/channels/:channel_id/contents/:content_id",
                delete(delete_content),
            )
            .route("/registrations", post(register));

        let app = Router::new()
            .nest("/board/api/v1", api)
            .route("/socket", get(socket))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { state, handle }
    }

    pub fn addr(&self) -> SocketAddr {
        self.state.addr
    }

    /// API base URL, ending in `/`.
    pub fn base_url(&self) -> String {
        self.state.base_url()
    }

    /// Emit root-relative `Link` targets from now on.
    pub fn use_relative_links(&self) {
        self.state.relative_links.store(true, Ordering::SeqCst);
    }

    /// Number of add-content requests received.
    pub fn add_requests(&self) -> usize {
        self.state.add_requests.load(Ordering::SeqCst)
    }

    /// Number of publish requests received.
    pub fn published(&self) -> usize {
        self.state.published.load(Ordering::SeqCst)
    }

    /// Number of acks received.
    pub fn acks(&self) -> usize {
        self.state.acks.load(Ordering::SeqCst)
    }

    /// Number of open event sockets.
    pub fn open_sockets(&self) -> usize {
        self.state.sockets.lock().unwrap().len()
    }

    /// Stored contents of a channel, in insertion order.
    pub fn stored_contents(&self, channel_id: &str) -> Vec<ContentItem> {
        self.state
            .store
            .lock()
            .unwrap()
            .contents
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Drop for MockBoardService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn page_response<T: Serialize>(
    all: &[T],
    cursor: usize,
    limit: usize,
    next_link: impl FnOnce(usize) -> String,
) -> Response {
    if limit == 0 {
        return (StatusCode::BAD_REQUEST, "limit must be positive").into_response();
    }
    let start = cursor.min(all.len());
    let end = (start + limit).min(all.len());

    let mut headers = HeaderMap::new();
    if end < all.len() {
        let link = format!("<{}>; rel=\"next\"", next_link(end));
        headers.insert(header::LINK, HeaderValue::from_str(&link).unwrap());
    }
    (headers, Json(json!({ "items": &all[start..end] }))).into_response()
}

async fn ping() -> Json<Value> {
    Json(json!({ "serviceName": "Board" }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChannelBody {
    acl_url_link: String,
}

async fn create_channel(
    State(state): State<Arc<MockState>>,
    Json(body): Json<CreateChannelBody>,
) -> Response {
    if body.acl_url_link.is_empty() {
        return (StatusCode::BAD_REQUEST, "aclUrlLink is required").into_response();
    }

    let channel_id = Uuid::new_v4().to_string();
    let channel = Channel {
        channel_id: channel_id.clone(),
        acl_url: body.acl_url_link,
        channel_url: Some(format!("{}channels/{}", state.base_url(), channel_id)),
        default_encryption_key_url: Some(format!("kms://keys/{}", Uuid::new_v4())),
    };

    let mut store = state.store.lock().unwrap();
    store.contents.insert(channel_id, Vec::new());
    store.channels.push(channel.clone());
    (StatusCode::CREATED, Json(channel)).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelsQuery {
    acl_url_link: String,
    channels_limit: Option<usize>,
    #[serde(default)]
    cursor: usize,
}

async fn list_channels(
    State(state): State<Arc<MockState>>,
    Query(query): Query<ChannelsQuery>,
) -> Response {
    let matching: Vec<Channel> = state
        .store
        .lock()
        .unwrap()
        .channels
        .iter()
        .filter(|c| c.acl_url == query.acl_url_link)
        .cloned()
        .collect();
    let limit = query.channels_limit.unwrap_or(100);

    page_response(&matching, query.cursor, limit, |next| {
        format!(
            "{}channels?aclUrlLink={}&channelsLimit={}&cursor={}",
            state.link_base(),
            urlencoding::encode(&query.acl_url_link),
            limit,
            next
        )
    })
}

async fn get_channel(
    State(state): State<Arc<MockState>>,
    Path(channel_id): Path<String>,
) -> Response {
    let store = state.store.lock().unwrap();
    match store.channels.iter().find(|c| c.channel_id == channel_id) {
        Some(channel) => Json(channel.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewContentBody {
    #[serde(rename = "type")]
    content_type: String,
    payload: String,
    #[serde(default)]
    encryption_key_url: Option<String>,
    #[serde(default)]
    scr: Option<EncryptedFileRef>,
    #[serde(default)]
    display_name: Option<String>,
}

async fn add_contents(
    State(state): State<Arc<MockState>>,
    Path(channel_id): Path<String>,
    Json(body): Json<Vec<NewContentBody>>,
) -> Response {
    state.add_requests.fetch_add(1, Ordering::SeqCst);
    if body.len() > MAX_ADD_BATCH {
        return (StatusCode::BAD_REQUEST, "too many items in one request").into_response();
    }
    if body.iter().any(|c| c.content_type.is_empty()) {
        return (StatusCode::BAD_REQUEST, "type is required").into_response();
    }

    let mut store = state.store.lock().unwrap();
    let Some(contents) = store.contents.get_mut(&channel_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let items: Vec<ContentItem> = body
        .into_iter()
        .map(|c| ContentItem {
            content_id: Uuid::new_v4().to_string(),
            content_type: c.content_type,
            payload: c.payload,
            encryption_key_url: c.encryption_key_url.unwrap_or_default(),
            scr: c.scr,
            display_name: c.display_name,
        })
        .collect();
    contents.extend(items.iter().cloned());
    Json(json!({ "items": items })).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentsQuery {
    contents_limit: Option<usize>,
    #[serde(default)]
    cursor: usize,
}

async fn list_contents(
    State(state): State<Arc<MockState>>,
    Path(channel_id): Path<String>,
    Query(query): Query<ContentsQuery>,
) -> Response {
    let Some(contents) = state
        .store
        .lock()
        .unwrap()
        .contents
        .get(&channel_id)
        .cloned()
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let limit = query.contents_limit.unwrap_or(100);

    page_response(&contents, query.cursor, limit, |next| {
        format!(
            "{}channels/{}/contents?contentsLimit={}&cursor={}",
            state.link_base(),
            channel_id,
            limit,
            next
        )
    })
}

async fn delete_content(
    State(state): State<Arc<MockState>>,
    Path((channel_id, content_id)): Path<(String, String)>,
) -> StatusCode {
    let mut store = state.store.lock().unwrap();
    let Some(contents) = store.contents.get_mut(&channel_id) else {
        return StatusCode::NOT_FOUND;
    };
    let before = contents.len();
    contents.retain(|c| c.content_id != content_id);
    if contents.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn delete_all_contents(
    State(state): State<Arc<MockState>>,
    Path(channel_id): Path<String>,
) -> StatusCode {
    let mut store = state.store.lock().unwrap();
    match store.contents.get_mut(&channel_id) {
        Some(contents) => {
            contents.clear();
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

#[derive(Deserialize)]
struct RegistrationBody {
    bindings: Vec<String>,
}

async fn register(
    State(state): State<Arc<MockState>>,
    Json(body): Json<RegistrationBody>,
) -> Response {
    if body.bindings.is_empty() {
        return (StatusCode::BAD_REQUEST, "bindings are required").into_response();
    }
    let id = Uuid::new_v4().to_string();
    state
        .registrations
        .lock()
        .unwrap()
        .insert(id.clone(), body.bindings);
    Json(json!({
        "webSocketUrl": format!("ws://{}/socket?registration={}", state.addr, id)
    }))
    .into_response()
}

#[derive(Deserialize)]
struct SocketQuery {
    registration: String,
}

async fn socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<MockState>>,
    Query(query): Query<SocketQuery>,
) -> Response {
    let Some(bindings) = state
        .registrations
        .lock()
        .unwrap()
        .get(&query.registration)
        .cloned()
    else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    // Join the hub before the handshake completes so nothing published
    // after connect() returns is missed.
    let (tx, rx) = mpsc::unbounded_channel();
    let socket_id = state.next_socket.fetch_add(1, Ordering::SeqCst);
    state
        .sockets
        .lock()
        .unwrap()
        .insert(socket_id, SocketEntry { bindings, tx });

    ws.on_upgrade(move |socket| handle_socket(socket, state, socket_id, rx))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<MockState>,
    socket_id: u64,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            Some(text) = rx.recv() => {
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => route_frame(&state, socket_id, &text),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.sockets.lock().unwrap().remove(&socket_id);
}

fn route_frame(state: &MockState, sender_id: u64, text: &str) {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return;
    };

    match frame["type"].as_str() {
        Some("ack") => {
            state.acks.fetch_add(1, Ordering::SeqCst);
        }
        Some("publishRequest") => {
            state.published.fetch_add(1, Ordering::SeqCst);
            let routes: Vec<String> = frame["recipients"]
                .as_array()
                .map(|recipients| {
                    recipients
                        .iter()
                        .filter_map(|r| r["route"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            let event = json!({
                "id": Uuid::new_v4().to_string(),
                "data": frame["data"],
                "timestamp": chrono::Utc::now().timestamp_millis(),
            })
            .to_string();

            let sockets = state.sockets.lock().unwrap();
            for (id, socket) in sockets.iter() {
                if *id != sender_id && socket.bindings.iter().any(|b| routes.contains(b)) {
                    let _ = socket.tx.send(event.clone());
                }
            }
        }
        _ => {}
    }
}

/// Event socket that completes the handshake and then never reads.
///
/// Pings go unanswered and close frames are never acknowledged. Built with
/// `start_closing`, it closes each socket right after the handshake instead.
pub struct SilentSocket {
    url: String,
    handle: JoinHandle<()>,
}

impl SilentSocket {
    pub async fn start() -> Self {
        Self::bind(false).await
    }

    /// Accept the handshake, then close the socket straight away.
    pub async fn start_closing() -> Self {
        Self::bind(true).await
    }

    async fn bind(close_at_once: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await {
                    if close_at_once {
                        let _ = socket.close(None).await;
                    } else {
                        held.push(socket);
                    }
                }
            }
        });
        Self {
            url: format!("ws://{addr}/socket"),
            handle,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for SilentSocket {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Encrypted file store kept in memory.
#[derive(Default)]
pub struct MemoryFiles {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl EncryptedFiles for MemoryFiles {
    async fn upload(
        &self,
        conversation: &Conversation,
        bytes: &[u8],
    ) -> corkboard::Result<EncryptedFileRef> {
        let loc = format!("memory://{}/{}", conversation.id, Uuid::new_v4());
        self.files
            .lock()
            .unwrap()
            .insert(loc.clone(), bytes.to_vec());
        let mut scr = EncryptedFileRef::new(loc);
        scr.extra.insert("key".to_string(), json!("test-key"));
        Ok(scr)
    }

    async fn download(&self, scr: &EncryptedFileRef) -> corkboard::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&scr.loc)
            .cloned()
            .ok_or_else(|| BoardError::NotFound(format!("file {}", scr.loc)))
    }
}

/// Configuration for a participant of `service`.
pub fn test_config(service: &MockBoardService) -> Config {
    let mut config = Config::default();
    config.service.base_url = service.base_url();
    config.service.connect_timeout_secs = 2;
    config.service.total_timeout_secs = 10;
    config.logging.level = "warn".to_string();
    config.logging.file = String::new();
    config
}

/// A participant client for `service`.
pub fn participant(service: &MockBoardService) -> BoardClient {
    BoardClient::new(test_config(service)).unwrap()
}

/// A conversation with a fresh id and key.
pub fn test_conversation() -> Conversation {
    Conversation::new(Uuid::new_v4().to_string())
        .with_encryption_key_url(format!("kms://keys/{}", Uuid::new_v4()))
}

/// Register a participant's realtime channel for `channel` and connect it.
pub async fn connect_realtime(client: &BoardClient, channel: &Channel) -> RealtimeChannel {
    let realtime = client.realtime();
    realtime
        .register(vec![client.binding_for(channel)])
        .await
        .unwrap();
    realtime.connect().await.unwrap();
    realtime
}

/// Wait until the state watch reports `want`.
pub async fn wait_for_state(
    changes: &mut watch::Receiver<ConnectionState>,
    want: ConnectionState,
) -> bool {
    matches!(
        tokio::time::timeout(DEFAULT_TIMEOUT, changes.wait_for(|s| *s == want)).await,
        Ok(Ok(_))
    )
}

/// Poll `check` until it holds or the default timeout passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
