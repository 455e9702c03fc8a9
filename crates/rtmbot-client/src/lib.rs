//! Client for the Slack Real Time Messaging protocol.
//!
//! A session is opened with a one-shot HTTP handshake ([`HandshakeClient`])
//! followed by a WebSocket dial against the resolved numeric address
//! ([`Dialer`]). Once connected, a receive loop dispatches every inbound
//! frame on its own task to the handler registered for its type, and a
//! heartbeat loop keeps the connection alive with `ping` frames.
//!
//! # Main types
//!
//! - [`RtmClient`]: Starts sessions from a token.
//! - [`Session`]: The live connection: identity, sending, disconnecting.
//! - [`SessionSignals`]: Callback-error and completion queues.
//! - [`Handlers`]: One optional handler per event kind.
//! - [`EventHandler`]: Trait implemented by handlers and async closures.
//!
//! # Example
//!
//! ```no_run
//! use rtmbot_client::{Handlers, HandlerResult, MessageEvent, RtmClient, Session};
//! use rtmbot_core::RtmConfig;
//!
//! async fn echo(session: Session, msg: MessageEvent) -> HandlerResult {
//!     if msg.user != session.bot_id() {
//!         session.send_message(&msg.channel, &msg.text).await?;
//!     }
//!     Ok(())
//! }
//!
//! # async fn run() -> rtmbot_core::RtmResult<()> {
//! let config = RtmConfig::default();
//! let client = RtmClient::new(&config)?.with_handlers(Handlers::new().on_message(echo));
//! let (_session, mut signals) = client.start("xoxb-token").await?;
//! let reason = signals.done.recv().await;
//! println!("session ended: {reason:?}");
//! # Ok(())
//! # }
//! ```

/// Transport dialer.
pub mod dialer;
/// Frame dispatch.
pub mod dispatch;
/// Inbound event types.
pub mod event;
/// Event handler registration.
pub mod handler;
/// `rtm.connect` handshake.
pub mod handshake;
/// Ping/pong liveness monitor.
pub mod heartbeat;
/// Outbound frame types.
pub mod outbound;
/// Session lifecycle.
pub mod session;
/// Hostname-bound TLS verification.
pub mod tls;

pub use dialer::{Dialer, Target, WsStream};
pub use dispatch::{dispatch, DispatchOutcome, DropReason};
pub use event::{
    DndStatus, DndUpdatedUser, Event, EventKind, Hello, MessageEvent, PresenceChange, Pong,
};
pub use handler::{EventHandler, HandlerResult, Handlers};
pub use handshake::{ConnectInfo, HandshakeClient, Team};
pub use heartbeat::Heartbeat;
pub use outbound::{OutboundMessage, Ping};
pub use session::{
    DisconnectReason, RtmClient, Session, SessionOptions, SessionSignals, SessionState,
};
