//! Frame classification and handler invocation.
//!
//! Frames are parsed twice: once for the `type` tag only, then into the
//! shape registered for that tag. Unknown or malformed frames are dropped
//! after a log record and never escalated.

use crate::event::{Event, EventKind};
use crate::handler::{HandlerResult, Slot};
use crate::session::Session;
use rtmbot_core::RtmError;
use serde::Deserialize;
use tracing::{debug, warn};

/// Why a frame was dropped without reaching a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Not valid JSON, or not the shape its tag promises.
    Malformed(String),
    /// Valid JSON without a `type` tag (e.g. `reply_to` acks for sent messages).
    Untagged,
    /// A tag this client does not know.
    Unrecognized(String),
}

/// Result of dispatching a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The registered handler ran and succeeded.
    Handled(EventKind),
    /// The event was recognized but no handler is registered.
    NoHandler(EventKind),
    /// A hidden message (edit or deletion) that is never dispatched.
    Suppressed,
    /// The handler failed; the error was queued.
    Failed(EventKind),
    /// The frame was dropped.
    Dropped(DropReason),
}

#[derive(Deserialize)]
struct TypeTag {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Classify `raw` and run the matching handler on this task.
pub async fn dispatch(session: &Session, raw: &str) -> DispatchOutcome {
    debug!(frame = %raw, "Received event");

    let tag = match serde_json::from_str::<TypeTag>(raw) {
        Ok(TypeTag { kind: Some(tag) }) => tag,
        Ok(TypeTag { kind: None }) => return dropped(DropReason::Untagged),
        Err(e) => return dropped(DropReason::Malformed(e.to_string())),
    };

    let Some(kind) = EventKind::from_tag(&tag) else {
        return dropped(DropReason::Unrecognized(tag));
    };

    match Event::parse(kind, raw) {
        Ok(event) => invoke(session, event).await,
        Err(e) => dropped(DropReason::Malformed(format!("{}: {e}", kind.tag()))),
    }
}

async fn invoke(session: &Session, event: Event) -> DispatchOutcome {
    let kind = event.kind();
    let handlers = session.handlers();

    let result = match event {
        Event::Hello(ev) => call(&handlers.hello, session, ev).await,
        Event::Message(ev) if ev.hidden => {
            debug!(subtype = ?ev.subtype, "Hidden message suppressed");
            return DispatchOutcome::Suppressed;
        }
        Event::Message(ev) => call(&handlers.message, session, ev).await,
        Event::Pong(ev) => {
            session.heartbeat().acknowledge(ev.reply_to);
            debug!(reply_to = ev.reply_to, "Pong received");
            call(&handlers.pong, session, ev).await
        }
        Event::PresenceChange(ev) => call(&handlers.presence_change, session, ev).await,
        Event::DndUpdatedUser(ev) => call(&handlers.dnd_updated_user, session, ev).await,
    };

    match result {
        None => DispatchOutcome::NoHandler(kind),
        Some(Ok(())) => DispatchOutcome::Handled(kind),
        Some(Err(source)) => {
            warn!(event = kind.tag(), error = %source, "Event handler failed");
            session.report_error(RtmError::Callback {
                event: kind.tag(),
                source,
            });
            DispatchOutcome::Failed(kind)
        }
    }
}

async fn call<E: Send + 'static>(
    slot: &Slot<E>,
    session: &Session,
    event: E,
) -> Option<HandlerResult> {
    match slot {
        Some(handler) => Some(handler.handle(session.clone(), event).await),
        None => None,
    }
}

fn dropped(reason: DropReason) -> DispatchOutcome {
    debug!(reason = ?reason, "Frame dropped");
    DispatchOutcome::Dropped(reason)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::event::{Hello, MessageEvent, Pong};
    use crate::handler::Handlers;
    use rtmbot_core::BoxError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_message_handlers(count: Arc<AtomicUsize>) -> Handlers {
        Handlers::new().on_message(move |_session: Session, _msg: MessageEvent| {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        })
    }

    #[tokio::test]
    async fn test_unrecognized_tag_is_noop() {
        let count = Arc::new(AtomicUsize::new(0));
        let (session, mut signals) = Session::detached(counting_message_handlers(count.clone()));

        let outcome = dispatch(&session, r#"{"type":"user_typing","channel":"C1"}"#).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Dropped(DropReason::Unrecognized("user_typing".into()))
        );
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(signals.callback_errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_and_untagged_frames_dropped() {
        let (session, _signals) = Session::detached(Handlers::new());
        assert!(matches!(
            dispatch(&session, "not json").await,
            DispatchOutcome::Dropped(DropReason::Malformed(_))
        ));
        assert_eq!(
            dispatch(&session, r#"{"ok":true,"reply_to":1,"ts":"1.0"}"#).await,
            DispatchOutcome::Dropped(DropReason::Untagged)
        );
        assert!(matches!(
            dispatch(&session, r#"{"type":"pong","reply_to":"x"}"#).await,
            DispatchOutcome::Dropped(DropReason::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_message_dispatched() {
        let count = Arc::new(AtomicUsize::new(0));
        let (session, _signals) = Session::detached(counting_message_handlers(count.clone()));

        let outcome = dispatch(
            &session,
            r#"{"type":"message","channel":"C1","user":"U2","text":"hi","ts":"1.0"}"#,
        )
        .await;
        assert_eq!(outcome, DispatchOutcome::Handled(EventKind::Message));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hidden_message_suppressed() {
        let count = Arc::new(AtomicUsize::new(0));
        let (session, _signals) = Session::detached(counting_message_handlers(count.clone()));

        let outcome = dispatch(
            &session,
            r#"{"type":"message","subtype":"message_deleted","hidden":true,"channel":"C1","ts":"2.0"}"#,
        )
        .await;
        assert_eq!(outcome, DispatchOutcome::Suppressed);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_known_event_without_handler() {
        let (session, mut signals) = Session::detached(Handlers::new());
        assert_eq!(
            dispatch(&session, r#"{"type":"hello"}"#).await,
            DispatchOutcome::NoHandler(EventKind::Hello)
        );
        assert!(signals.callback_errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handler_error_is_queued() {
        let handlers = Handlers::new().on_hello(|_session: Session, _hello: Hello| async move {
            Err::<(), BoxError>("not ready".into())
        });
        let (session, mut signals) = Session::detached(handlers);

        assert_eq!(
            dispatch(&session, r#"{"type":"hello"}"#).await,
            DispatchOutcome::Failed(EventKind::Hello)
        );
        match signals.callback_errors.try_recv().unwrap() {
            RtmError::Callback { event, source } => {
                assert_eq!(event, "hello");
                assert_eq!(source.to_string(), "not ready");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!session.is_disconnected());
    }

    #[tokio::test]
    async fn test_pong_updates_heartbeat_before_handler() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_handler = seen.clone();
        let handlers = Handlers::new().on_pong(move |session: Session, pong: Pong| {
            let seen = seen_in_handler.clone();
            async move {
                assert_eq!(session.heartbeat().last_pong(), pong.reply_to);
                seen.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });
        let (session, _signals) = Session::detached(handlers);
        for _ in 0..5 {
            session.heartbeat().next_ping();
        }

        let outcome = dispatch(&session, r#"{"type":"pong","reply_to":5}"#).await;
        assert_eq!(outcome, DispatchOutcome::Handled(EventKind::Pong));
        assert_eq!(session.heartbeat().last_pong(), 5);
        assert!(!session.heartbeat().is_overdue());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pong_without_handler_still_acknowledged() {
        let (session, _signals) = Session::detached(Handlers::new());
        session.heartbeat().next_ping();
        assert_eq!(
            dispatch(&session, r#"{"type":"pong","reply_to":1}"#).await,
            DispatchOutcome::NoHandler(EventKind::Pong)
        );
        assert_eq!(session.heartbeat().last_pong(), 1);
    }
}
