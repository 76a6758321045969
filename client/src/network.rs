//! Transport session: WebSocket connection lifecycle, join handshake and
//! reconnection.
//!
//! The connection itself is driven by a task on a tokio runtime. The game
//! loop owns a [`TransportSession`] handle and drains [`SessionEvent`]s from
//! it once per frame, so every state mutation happens on the game thread.

use crate::retry::{FixedDelay, RetryPolicy};
use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection is not open")]
    NotOpen,
    #[error("transport driver has stopped")]
    DriverStopped,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// `attempt` is 0 for the first connection, then the reconnect number.
    Connecting { attempt: u32 },
    Open,
    /// `attempts` counts consecutive failures since the last open.
    Closed { attempts: u32 },
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Reconnect(Duration),
    /// A reconnect is already pending; this close joins it.
    AlreadyScheduled,
    GaveUp,
}

/// Reconnect bookkeeping with no I/O attached.
pub struct ConnectionTracker {
    state: ConnectionState,
    failed_attempts: u32,
    reconnect_pending: bool,
    policy: Arc<dyn RetryPolicy>,
}

impl ConnectionTracker {
    pub fn new(policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            state: ConnectionState::Closed { attempts: 0 },
            failed_attempts: 0,
            reconnect_pending: false,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Starts a connection attempt, consuming any pending reconnect.
    pub fn begin_connect(&mut self) -> u32 {
        self.reconnect_pending = false;
        self.state = ConnectionState::Connecting {
            attempt: self.failed_attempts,
        };
        self.failed_attempts
    }

    pub fn on_open(&mut self) {
        self.state = ConnectionState::Open;
        self.failed_attempts = 0;
    }

    pub fn on_close(&mut self) -> CloseOutcome {
        if self.reconnect_pending {
            return CloseOutcome::AlreadyScheduled;
        }

        self.failed_attempts += 1;
        self.state = ConnectionState::Closed {
            attempts: self.failed_attempts,
        };

        if !self.policy.allows(self.failed_attempts) {
            return CloseOutcome::GaveUp;
        }

        self.reconnect_pending = true;
        CloseOutcome::Reconnect(self.policy.delay(self.failed_attempts))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connecting {
        attempt: u32,
    },
    Opened,
    Message(ServerMessage),
    /// The connection did not open within the configured timeout. Advisory:
    /// the attempt keeps running.
    ConnectTimeout(Duration),
    Closed {
        reason: String,
        attempts: u32,
        reconnect_in: Option<Duration>,
    },
}

#[derive(Clone)]
pub struct TransportConfig {
    pub endpoint: String,
    pub username: String,
    pub connect_timeout: Duration,
    pub retry_policy: Arc<dyn RetryPolicy>,
}

impl TransportConfig {
    pub fn new(endpoint: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_policy: Arc::new(FixedDelay::default()),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }
}

/// Where outbound intents go. Implemented by [`TransportSession`].
pub trait Outbound {
    fn is_open(&self) -> bool;
    fn send(&self, message: ClientMessage) -> Result<(), TransportError>;
}

/// Game-thread handle to the connection driver.
///
/// The connection state seen here is mirrored from drained events, so it
/// only changes when [`poll_events`](Self::poll_events) or
/// [`next_event`](Self::next_event) runs.
pub struct TransportSession {
    state: ConnectionState,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    outbound_tx: mpsc::UnboundedSender<ClientMessage>,
}

impl TransportSession {
    /// Opens the connection on `runtime`. Dropping the session shuts the
    /// driver down.
    pub fn spawn(runtime: &Handle, config: TransportConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        runtime.spawn(drive(config, events_tx, outbound_rx));

        Self {
            state: ConnectionState::Connecting { attempt: 0 },
            events_rx,
            outbound_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Drains every event that has arrived since the last call.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            self.observe(&event);
            events.push(event);
        }
        events
    }

    /// Waits for the next event. `None` once the driver has stopped.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let event = self.events_rx.recv().await?;
        self.observe(&event);
        Some(event)
    }

    fn observe(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Connecting { attempt } => {
                self.state = ConnectionState::Connecting { attempt: *attempt };
            }
            SessionEvent::Opened => self.state = ConnectionState::Open,
            SessionEvent::Closed { attempts, .. } => {
                self.state = ConnectionState::Closed {
                    attempts: *attempts,
                };
            }
            SessionEvent::Message(_) | SessionEvent::ConnectTimeout(_) => {}
        }
    }
}

impl Outbound for TransportSession {
    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        if !self.state.is_open() {
            error!(
                "Cannot send {}: connection is {:?}",
                message.action(),
                self.state
            );
            return Err(TransportError::NotOpen);
        }

        self.outbound_tx
            .send(message)
            .map_err(|_| TransportError::DriverStopped)
    }
}

enum ConnectionEnd {
    Closed(String),
    Shutdown,
}

/// Connect, run, and reconnect until the session handle is dropped or the
/// retry policy gives up. Only one connection exists at a time.
async fn drive(
    config: TransportConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
) {
    let mut tracker = ConnectionTracker::new(Arc::clone(&config.retry_policy));

    loop {
        let attempt = tracker.begin_connect();
        info!("Connecting to {} (attempt {})", config.endpoint, attempt);
        if events.send(SessionEvent::Connecting { attempt }).is_err() {
            return;
        }

        // Intents queued while the link was down are stale.
        while outbound.try_recv().is_ok() {
            warn!("Dropping intent queued while disconnected");
        }

        let reason = match open_connection(&config, &events).await {
            Ok(socket) => {
                tracker.on_open();
                info!("Connected to {}", config.endpoint);
                if events.send(SessionEvent::Opened).is_err() {
                    return;
                }

                match run_connection(socket, &config, &events, &mut outbound).await {
                    ConnectionEnd::Closed(reason) => reason,
                    ConnectionEnd::Shutdown => {
                        info!("Transport session shut down");
                        return;
                    }
                }
            }
            Err(e) => e.to_string(),
        };

        match tracker.on_close() {
            CloseOutcome::Reconnect(delay) => {
                warn!("Connection closed ({}), reconnecting in {:?}", reason, delay);
                let event = SessionEvent::Closed {
                    reason,
                    attempts: tracker.failed_attempts(),
                    reconnect_in: Some(delay),
                };
                if events.send(event).is_err() {
                    return;
                }
                sleep(delay).await;
            }
            CloseOutcome::AlreadyScheduled => {
                debug!("Close while reconnect pending: {}", reason);
            }
            CloseOutcome::GaveUp => {
                error!(
                    "Connection closed ({}), giving up after {} attempts",
                    reason,
                    tracker.failed_attempts()
                );
                let _ = events.send(SessionEvent::Closed {
                    reason,
                    attempts: tracker.failed_attempts(),
                    reconnect_in: None,
                });
                return;
            }
        }
    }
}

/// Waits for the WebSocket handshake. Past `connect_timeout` a timeout is
/// reported once but the attempt is left running.
async fn open_connection(
    config: &TransportConfig,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> Result<Socket, TransportError> {
    let connect = connect_async(config.endpoint.as_str());
    tokio::pin!(connect);
    let deadline = sleep(config.connect_timeout);
    tokio::pin!(deadline);
    let mut timeout_reported = false;

    loop {
        tokio::select! {
            result = &mut connect => {
                let (socket, _response) = result?;
                return Ok(socket);
            }
            _ = &mut deadline, if !timeout_reported => {
                timeout_reported = true;
                warn!(
                    "No connection to {} after {:?}, still waiting",
                    config.endpoint, config.connect_timeout
                );
                let _ = events.send(SessionEvent::ConnectTimeout(config.connect_timeout));
            }
        }
    }
}

async fn run_connection(
    socket: Socket,
    config: &TransportConfig,
    events: &mpsc::UnboundedSender<SessionEvent>,
    outbound: &mut mpsc::UnboundedReceiver<ClientMessage>,
) -> ConnectionEnd {
    let (mut sink, mut stream) = socket.split();

    let join = ClientMessage::JoinGame {
        username: config.username.clone(),
    };
    if let Err(e) = send_message(&mut sink, &join).await {
        return ConnectionEnd::Closed(format!("join request failed: {}", e));
    }

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !forward_frame(&text, events) {
                        return ConnectionEnd::Shutdown;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if !forward_frame(&text, events) {
                            return ConnectionEnd::Shutdown;
                        }
                    }
                    Err(e) => warn!("Discarding non-UTF-8 binary frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("closed by server: {} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return ConnectionEnd::Closed(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return ConnectionEnd::Closed(e.to_string()),
                None => return ConnectionEnd::Closed("stream ended".to_string()),
            },

            outgoing = outbound.recv() => match outgoing {
                Some(message) => {
                    if let Err(e) = send_message(&mut sink, &message).await {
                        return ConnectionEnd::Closed(format!("send failed: {}", e));
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return ConnectionEnd::Shutdown;
                }
            },
        }
    }
}

/// Decodes one inbound payload and hands it to the game thread. Malformed
/// payloads are logged and dropped. Returns false once the game thread is
/// gone.
fn forward_frame(text: &str, events: &mpsc::UnboundedSender<SessionEvent>) -> bool {
    match decode_frame(text) {
        Some(message) => events.send(SessionEvent::Message(message)).is_ok(),
        None => true,
    }
}

fn decode_frame(text: &str) -> Option<ServerMessage> {
    match ServerMessage::decode(text) {
        Ok(message) => {
            debug!("<- {}", message.action());
            Some(message)
        }
        Err(e) => {
            warn!("Discarding malformed message: {}", e);
            None
        }
    }
}

async fn send_message<S>(sink: &mut S, message: &ClientMessage) -> Result<(), TransportError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = message.encode()?;
    debug!("-> {}", text);
    sink.send(Message::Text(text)).await?;
    Ok(())
}
