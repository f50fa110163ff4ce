//! Realtime channel: registration, socket lifecycle, publish, and delivery.
//!
//! State machine: `Disconnected -> Registering -> Connected -> Disconnected`.
//! A failed connect leaves the channel `Disconnected` with its registration
//! kept, so `connect` may be retried; `disconnect` drops the registration.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{
    ActivityData, ClientFrame, Envelope, RealtimeEvent, Recipient, ServerFrame, BOARD_ACTIVITY,
};
use super::payload::BoardPayload;
use super::router::{EventRouter, ListenerToken};
use crate::binding::realtime_binding;
use crate::board::Conversation;
use crate::config::RealtimeConfig;
use crate::http::ServiceClient;
use crate::{BoardError, Result};

/// Maximum number of events buffered for each subscriber.
const EVENT_CAPACITY: usize = 100;

/// Maximum number of frames queued for sending.
const OUTGOING_CAPACITY: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state of a realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Registering,
    Connected,
}

/// Socket location and bindings granted by a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub web_socket_url: String,
    pub bindings: Vec<String>,
}

#[derive(Serialize)]
struct RegistrationRequest<'a> {
    bindings: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationResponse {
    web_socket_url: String,
}

/// Activity to publish on a channel's route.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishData {
    pub envelope: Envelope,
    pub payload: BoardPayload,
}

impl PublishData {
    pub fn new(envelope: Envelope, payload: BoardPayload) -> Self {
        Self { envelope, payload }
    }
}

struct Connection {
    outgoing: mpsc::Sender<Message>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    router: EventRouter,
    events: broadcast::Sender<RealtimeEvent>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn deliver(&self, event: RealtimeEvent) {
        let fired = self.router.dispatch(&event.event_name(), &event);
        debug!("Delivered {} to {} listeners", event.event_name(), fired);
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// One participant's realtime connection to board activity.
pub struct RealtimeChannel {
    service: ServiceClient,
    config: RealtimeConfig,
    shared: Arc<Shared>,
    context: Mutex<Option<ConnectionContext>>,
    connection: tokio::sync::Mutex<Option<Connection>>,
}

impl RealtimeChannel {
    /// Create a disconnected channel.
    pub fn new(service: ServiceClient, config: RealtimeConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            config,
            shared: Arc::new(Shared {
                state,
                router: EventRouter::new(),
                events,
            }),
            context: Mutex::new(None),
            connection: tokio::sync::Mutex::new(None),
        }
    }

    /// Connection timers and binding prefix.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch state changes, including drops detected by the socket task.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn lock_context(&self) -> MutexGuard<'_, Option<ConnectionContext>> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current registration, if any.
    pub fn context(&self) -> Option<ConnectionContext> {
        self.lock_context().clone()
    }

    /// Route used for a channel id on this connection.
    pub fn binding_for(&self, channel_id: &str) -> String {
        realtime_binding(&self.config.binding_prefix, channel_id)
    }

    /// Register bindings with the service and obtain a socket URL.
    ///
    /// Only valid while disconnected.
    pub async fn register(&self, bindings: Vec<String>) -> Result<ConnectionContext> {
        if self.state() != ConnectionState::Disconnected {
            return Err(BoardError::Validation(format!(
                "cannot register while {:?}",
                self.state()
            )));
        }
        if bindings.is_empty() || bindings.iter().any(|b| b.trim().is_empty()) {
            return Err(BoardError::Validation(
                "at least one non-empty binding is required".to_string(),
            ));
        }

        let response: RegistrationResponse = self
            .service
            .post_json("registrations", &RegistrationRequest { bindings: &bindings })
            .await?;

        let context = ConnectionContext {
            web_socket_url: response.web_socket_url,
            bindings,
        };
        self.use_context(context.clone())?;
        info!("Registered {} bindings", context.bindings.len());
        Ok(context)
    }

    /// Adopt a registration obtained elsewhere.
    ///
    /// Only valid while disconnected; moves the channel to `Registering`.
    pub fn use_context(&self, context: ConnectionContext) -> Result<()> {
        if self.state() != ConnectionState::Disconnected {
            return Err(BoardError::Validation(format!(
                "cannot change registration while {:?}",
                self.state()
            )));
        }
        if context.web_socket_url.trim().is_empty() {
            return Err(BoardError::Validation(
                "web socket URL must not be empty".to_string(),
            ));
        }
        *self.lock_context() = Some(context);
        self.shared.set_state(ConnectionState::Registering);
        Ok(())
    }

    /// Open the socket for the current registration.
    ///
    /// A no-op when already connected. On failure the channel is left
    /// `Disconnected` and the registration kept for a retry.
    pub async fn connect(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }
        let Some(context) = self.context() else {
            return Err(BoardError::Validation(
                "connect requires a registration".to_string(),
            ));
        };

        // A socket that died on its own leaves a finished task behind
        if let Some(stale) = connection.take() {
            stale.task.abort();
        }

        debug!("Connecting to {}", context.web_socket_url);
        let handshake = tokio::time::timeout(
            self.config.pong_timeout(),
            connect_async(context.web_socket_url.as_str()),
        )
        .await;

        let socket = match handshake {
            Ok(Ok((socket, _response))) => socket,
            Ok(Err(e)) => {
                self.shared.set_state(ConnectionState::Disconnected);
                warn!("Connect to {} failed: {}", context.web_socket_url, e);
                return Err(e.into());
            }
            Err(_) => {
                self.shared.set_state(ConnectionState::Disconnected);
                warn!("Connect to {} timed out", context.web_socket_url);
                return Err(BoardError::Connection(format!(
                    "handshake with {} timed out",
                    context.web_socket_url
                )));
            }
        };

        // Set before spawning so an immediate server close is not overwritten
        self.shared.set_state(ConnectionState::Connected);

        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_socket(
            socket,
            outgoing_rx,
            shutdown_rx,
            Arc::clone(&self.shared),
            self.config.clone(),
        ));

        *connection = Some(Connection {
            outgoing: outgoing_tx,
            shutdown: Some(shutdown_tx),
            task,
        });
        info!("Connected to {}", context.web_socket_url);
        Ok(())
    }

    /// Publish activity to the route of `data.envelope.channel_id`.
    ///
    /// The envelope inherits the conversation id and key when unset.
    pub async fn publish(&self, conversation: &Conversation, data: PublishData) -> Result<()> {
        let outgoing = {
            let connection = self.connection.lock().await;
            match connection.as_ref() {
                Some(c) if self.connected() => c.outgoing.clone(),
                _ => {
                    return Err(BoardError::Connection(
                        "realtime channel is not connected".to_string(),
                    ))
                }
            }
        };

        let PublishData {
            mut envelope,
            payload,
        } = data;
        if envelope.channel_id.trim().is_empty() {
            return Err(BoardError::Validation(
                "envelope channel id must not be empty".to_string(),
            ));
        }
        if envelope.room_id.is_none() {
            envelope.room_id = Some(conversation.id.clone());
        }
        if envelope.encryption_key_url.is_none() {
            envelope.encryption_key_url = conversation.default_encryption_key_url.clone();
        }

        let route = self.binding_for(&envelope.channel_id);
        let frame = ClientFrame::PublishRequest {
            id: uuid::Uuid::new_v4().to_string(),
            recipients: vec![Recipient::route(route.as_str())],
            data: ActivityData {
                event_type: BOARD_ACTIVITY.to_string(),
                content_type: payload.content_type(),
                payload: payload.to_value()?,
                envelope: Some(envelope),
            },
        };
        let text = serde_json::to_string(&frame)?;

        outgoing
            .send(Message::Text(text))
            .await
            .map_err(|_| BoardError::Connection("socket closed".to_string()))?;
        debug!("Queued publish to {}", route);
        Ok(())
    }

    /// Listen for the next event named `event`.
    pub fn once<F>(&self, event: &str, handler: F) -> ListenerToken
    where
        F: FnOnce(RealtimeEvent) + Send + 'static,
    {
        self.shared.router.once(event, handler)
    }

    /// Listen for every event named `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> ListenerToken
    where
        F: Fn(RealtimeEvent) + Send + Sync + 'static,
    {
        self.shared.router.on(event, handler)
    }

    pub fn off(&self, token: ListenerToken) -> bool {
        self.shared.router.off(token)
    }

    /// Receive every delivered event, regardless of name.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.shared.events.subscribe()
    }

    /// Close the socket and drop the registration.
    ///
    /// Waits at most `force_close_delay` for the close handshake. Without an
    /// open socket it only drops a pending registration.
    pub async fn disconnect(&self) -> Result<()> {
        let mut guard = self.connection.lock().await;
        let Some(mut connection) = guard.take() else {
            *self.lock_context() = None;
            if self.state() != ConnectionState::Disconnected {
                self.shared.set_state(ConnectionState::Disconnected);
            }
            return Ok(());
        };

        if let Some(shutdown) = connection.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = connection.task.await {
            warn!("Socket task ended abnormally: {}", e);
        }

        *self.lock_context() = None;
        self.shared.set_state(ConnectionState::Disconnected);
        info!("Disconnected");
        Ok(())
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("state", &self.state())
            .field("context", &self.context())
            .finish()
    }
}

async fn run_socket(
    socket: Socket,
    mut outgoing: mpsc::Receiver<Message>,
    mut shutdown: oneshot::Receiver<()>,
    shared: Arc<Shared>,
    config: RealtimeConfig,
) {
    let (mut sink, mut stream) = socket.split();

    let mut ping_timer = tokio::time::interval(config.ping_interval());
    // The first tick completes immediately
    ping_timer.tick().await;
    let mut pong_deadline: Option<Instant> = None;

    loop {
        let deadline = pong_deadline;
        tokio::select! {
            _ = &mut shutdown => {
                close_gracefully(&mut sink, &mut stream, &config).await;
                break;
            }
            Some(message) = outgoing.recv() => {
                if let Err(e) = sink.send(message).await {
                    warn!("Send failed: {}", e);
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(ack) = handle_text(&shared, &text) {
                            if let Err(e) = sink.send(ack).await {
                                warn!("Ack failed: {}", e);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        pong_deadline = None;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Socket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Socket error: {}", e);
                        break;
                    }
                }
            }
            _ = ping_timer.tick() => {
                if pong_deadline.is_none() {
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        warn!("Ping failed: {}", e);
                        break;
                    }
                    pong_deadline = Some(Instant::now() + config.pong_timeout());
                }
            }
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                warn!("No pong within {:?}; dropping socket", config.pong_timeout());
                break;
            }
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}

/// Handle a text frame. Returns the ack to send, if the frame had an id.
fn handle_text(shared: &Shared, text: &str) -> Option<Message> {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping malformed frame: {}", e);
            return None;
        }
    };

    let ack = frame.id.clone().and_then(|message_id| {
        serde_json::to_string(&ClientFrame::Ack { message_id })
            .ok()
            .map(Message::Text)
    });

    match frame.into_event() {
        Some(event) => shared.deliver(event),
        None => debug!("Ignoring frame without activity"),
    }
    ack
}

async fn close_gracefully(
    sink: &mut futures::stream::SplitSink<Socket, Message>,
    stream: &mut futures::stream::SplitStream<Socket>,
    config: &RealtimeConfig,
) {
    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!("Close frame not sent: {}", e);
        return;
    }

    let handshake = async {
        while let Some(Ok(message)) = stream.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    };
    if tokio::time::timeout(config.force_close_delay(), handshake)
        .await
        .is_err()
    {
        debug!(
            "Close handshake exceeded {:?}; dropping socket",
            config.force_close_delay()
        );
    }
}
