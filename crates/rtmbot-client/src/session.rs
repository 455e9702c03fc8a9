use crate::dialer::{Dialer, WsStream};
use crate::dispatch;
use crate::handler::Handlers;
use crate::handshake::{ConnectInfo, HandshakeClient, Team};
use crate::heartbeat::{self, Heartbeat};
use crate::outbound::OutboundMessage;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rtmbot_core::{RtmConfig, RtmError, RtmResult};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info};

const CONNECTING: u8 = 0;
const CONNECTED: u8 = 1;
const DISCONNECTED: u8 = 2;

/// Lifecycle of a [`Session`]. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake and dial in progress. Internal only: [`RtmClient::start`]
    /// hands out a session once it is already connected.
    Connecting,
    /// Receive and heartbeat loops are running.
    Connected,
    /// The connection has been closed.
    Disconnected,
}

/// Why a session ended. Posted once on [`SessionSignals::done`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// [`Session::disconnect`] was called.
    Requested,
    /// The server closed the connection.
    PeerClosed,
    /// Reading from the connection failed.
    ReadFailed(String),
    /// Too many pings went unanswered.
    HeartbeatTimeout {
        /// Id of the last ping sent.
        last_ping: i32,
        /// Id of the last ping acknowledged.
        last_pong: i32,
    },
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "disconnect requested"),
            Self::PeerClosed => write!(f, "connection closed by peer"),
            Self::ReadFailed(e) => write!(f, "read failed: {e}"),
            Self::HeartbeatTimeout {
                last_ping,
                last_pong,
            } => write!(f, "heartbeat timeout (last ping {last_ping}, last pong {last_pong})"),
        }
    }
}

/// Delivery queues handed to the embedding application.
#[derive(Debug)]
pub struct SessionSignals {
    /// Errors returned by event handlers.
    pub callback_errors: mpsc::UnboundedReceiver<RtmError>,
    /// Receives exactly one entry when the session ends.
    pub done: mpsc::Receiver<DisconnectReason>,
}

/// Timing of the heartbeat monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Time between pings.
    pub heartbeat_interval: Duration,
    /// Tolerated gap between the last ping and the last pong.
    pub max_missed: i32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(60),
            max_missed: 2,
        }
    }
}

impl SessionOptions {
    /// Reject settings the heartbeat loop cannot run with.
    pub fn validate(&self) -> RtmResult<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(RtmError::Config(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }
        if self.max_missed < 1 {
            return Err(RtmError::Config(format!(
                "heartbeat max_missed must be at least 1, got {}",
                self.max_missed
            )));
        }
        Ok(())
    }
}

impl From<&RtmConfig> for SessionOptions {
    fn from(config: &RtmConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat.interval(),
            max_missed: config.heartbeat.max_missed,
        }
    }
}

/// Starts sessions: handshake, dial, then the receive and heartbeat loops.
#[derive(Debug, Clone)]
pub struct RtmClient {
    handshake: HandshakeClient,
    dialer: Dialer,
    options: SessionOptions,
    handlers: Handlers,
}

impl RtmClient {
    /// Build a client from configuration with no handlers registered.
    pub fn new(config: &RtmConfig) -> RtmResult<Self> {
        config.validate()?;
        Self::from_parts(
            HandshakeClient::from_config(config)?,
            Dialer::from_config(config)?,
            SessionOptions::from(config),
        )
    }

    /// Build a client from already configured components.
    pub fn from_parts(
        handshake: HandshakeClient,
        dialer: Dialer,
        options: SessionOptions,
    ) -> RtmResult<Self> {
        options.validate()?;
        Ok(Self {
            handshake,
            dialer,
            options,
            handlers: Handlers::new(),
        })
    }

    /// Replace the registered handlers.
    pub fn with_handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Handshake with `token`, dial the returned URL and start the session.
    ///
    /// Failures here abort the start; nothing is left running.
    pub async fn start(&self, token: &str) -> RtmResult<(Session, SessionSignals)> {
        let info = self.handshake.connect(token).await?;
        let ws = self.dialer.dial(&info.url).await?;
        info!(bot = %info.bot_name, bot_id = %info.bot_id, "Connected. Listening for events.");
        Ok(Session::start(info, ws, self.handlers.clone(), self.options))
    }
}

/// A live connection. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    bot_id: String,
    bot_name: String,
    team: Team,
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    message_id: AtomicI32,
    heartbeat: Heartbeat,
    state: AtomicU8,
    closed: watch::Sender<bool>,
    done_tx: mpsc::Sender<DisconnectReason>,
    error_tx: mpsc::UnboundedSender<RtmError>,
    handlers: Handlers,
}

impl Session {
    fn new(
        info: ConnectInfo,
        sink: Option<SplitSink<WsStream, Message>>,
        handlers: Handlers,
        options: SessionOptions,
    ) -> (Self, SessionSignals) {
        let (done_tx, done) = mpsc::channel(1);
        let (error_tx, callback_errors) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let session = Self {
            inner: Arc::new(SessionInner {
                bot_id: info.bot_id,
                bot_name: info.bot_name,
                team: info.team,
                sink: Mutex::new(sink),
                message_id: AtomicI32::new(0),
                heartbeat: Heartbeat::new(options.max_missed),
                state: AtomicU8::new(CONNECTING),
                closed,
                done_tx,
                error_tx,
                handlers,
            }),
        };
        let signals = SessionSignals {
            callback_errors,
            done,
        };
        (session, signals)
    }

    fn start(
        info: ConnectInfo,
        ws: WsStream,
        handlers: Handlers,
        options: SessionOptions,
    ) -> (Self, SessionSignals) {
        let (sink, stream) = ws.split();
        let (session, signals) = Self::new(info, Some(sink), handlers, options);
        session.inner.state.store(CONNECTED, Ordering::Release);

        tokio::spawn(receive_loop(
            session.clone(),
            stream,
            session.inner.closed.subscribe(),
        ));
        tokio::spawn(heartbeat::run(
            session.clone(),
            options.heartbeat_interval,
            session.inner.closed.subscribe(),
        ));

        (session, signals)
    }

    /// A connected session with no transport, for exercising dispatch.
    #[cfg(test)]
    pub(crate) fn detached(handlers: Handlers) -> (Self, SessionSignals) {
        let info = ConnectInfo {
            url: String::new(),
            bot_id: "U0".into(),
            bot_name: "bot".into(),
            team: Team::default(),
        };
        let (session, signals) = Self::new(info, None, handlers, SessionOptions::default());
        session.inner.state.store(CONNECTED, Ordering::Release);
        (session, signals)
    }

    /// The bot's own user id.
    pub fn bot_id(&self) -> &str {
        &self.inner.bot_id
    }

    /// The bot's display name.
    pub fn bot_name(&self) -> &str {
        &self.inner.bot_name
    }

    /// The workspace the bot is connected to.
    pub fn team(&self) -> &Team {
        &self.inner.team
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        match self.inner.state.load(Ordering::Acquire) {
            CONNECTING => SessionState::Connecting,
            CONNECTED => SessionState::Connected,
            _ => SessionState::Disconnected,
        }
    }

    /// Whether the session has reached its terminal state.
    pub fn is_disconnected(&self) -> bool {
        self.state() == SessionState::Disconnected
    }

    /// Send `text` to `channel` and return the message id used.
    ///
    /// The id is consumed even when the write fails.
    pub async fn send_message(&self, channel: &str, text: &str) -> RtmResult<i32> {
        let mut sink = self.inner.sink.lock().await;
        let id = self.inner.message_id.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(id, channel = %channel, "Sending message");

        let sink = sink
            .as_mut()
            .ok_or_else(|| RtmError::Transport("connection is closed".to_string()))?;
        write_frame(sink, &OutboundMessage::new(id, channel, text)).await?;
        Ok(id)
    }

    /// Close the connection and post to the completion queue.
    ///
    /// Returns [`RtmError::AlreadyDisconnected`] if the session had already
    /// ended, whatever ended it.
    pub async fn disconnect(&self) -> RtmResult<()> {
        self.shutdown(DisconnectReason::Requested).await
    }

    /// The single teardown path. Only the caller that moves the state from
    /// `Connected` to `Disconnected` closes the sink and posts `done`.
    pub(crate) async fn shutdown(&self, reason: DisconnectReason) -> RtmResult<()> {
        if self
            .inner
            .state
            .compare_exchange(CONNECTED, DISCONNECTED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RtmError::AlreadyDisconnected);
        }

        info!(reason = %reason, "Disconnecting.");
        self.inner.closed.send_replace(true);

        let sink = self.inner.sink.lock().await.take();
        let closed = match sink {
            Some(mut sink) => match sink.close().await {
                Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
                Err(e) => Err(RtmError::Transport(format!("Close failed: {e}"))),
            },
            None => Ok(()),
        };

        if self.inner.done_tx.try_send(reason).is_err() {
            debug!("Completion receiver is gone");
        }
        closed
    }

    pub(crate) async fn send_frame<T: Serialize>(&self, frame: &T) -> RtmResult<()> {
        let mut sink = self.inner.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or_else(|| RtmError::Transport("connection is closed".to_string()))?;
        write_frame(sink, frame).await
    }

    pub(crate) fn heartbeat(&self) -> &Heartbeat {
        &self.inner.heartbeat
    }

    pub(crate) fn handlers(&self) -> &Handlers {
        &self.inner.handlers
    }

    pub(crate) fn report_error(&self, err: RtmError) {
        if self.inner.error_tx.send(err).is_err() {
            debug!("Callback error receiver is gone");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("bot_id", &self.inner.bot_id)
            .field("bot_name", &self.inner.bot_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn write_frame<T: Serialize>(
    sink: &mut SplitSink<WsStream, Message>,
    frame: &T,
) -> RtmResult<()> {
    let json = serde_json::to_string(frame)?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| RtmError::Transport(format!("Write failed: {e}")))
}

/// Read frames until the connection fails or the session closes, spawning
/// one dispatch task per text frame. Always ends in a disconnect.
async fn receive_loop(
    session: Session,
    mut stream: SplitStream<WsStream>,
    mut closed: watch::Receiver<bool>,
) {
    let reason = loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = closed.changed() => break DisconnectReason::Requested,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                let session = session.clone();
                tokio::spawn(async move {
                    dispatch::dispatch(&session, &text).await;
                });
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(frame = ?frame, "Close frame received");
                break DisconnectReason::PeerClosed;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!(error = %e, "Error receiving from WebSocket");
                break DisconnectReason::ReadFailed(e.to_string());
            }
            None => break DisconnectReason::PeerClosed,
        }
    };

    // Silent when another trigger already disconnected.
    let _ = session.shutdown(reason).await;
}
