use crate::event::{DndUpdatedUser, EventKind, Hello, MessageEvent, PresenceChange, Pong};
use crate::session::Session;
use async_trait::async_trait;
use rtmbot_core::BoxError;
use std::future::Future;
use std::sync::Arc;

/// What an event handler returns. Errors end up on the callback-error queue.
pub type HandlerResult = Result<(), BoxError>;

/// Handles one kind of event.
///
/// Implemented for every `Fn(Session, E) -> impl Future<Output = HandlerResult>`,
/// so plain `async fn`s and closures can be registered directly.
#[async_trait]
pub trait EventHandler<E: Send + 'static>: Send + Sync + 'static {
    /// Handle `event`. `session` can be used to reply.
    async fn handle(&self, session: Session, event: E) -> HandlerResult;
}

#[async_trait]
impl<E, F, Fut> EventHandler<E> for F
where
    E: Send + 'static,
    F: Fn(Session, E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, session: Session, event: E) -> HandlerResult {
        (self)(session, event).await
    }
}

pub(crate) type Slot<E> = Option<Arc<dyn EventHandler<E>>>;

/// One optional handler per event kind.
///
/// An empty slot makes the corresponding event a no-op.
#[derive(Clone, Default)]
pub struct Handlers {
    pub(crate) hello: Slot<Hello>,
    pub(crate) message: Slot<MessageEvent>,
    pub(crate) pong: Slot<Pong>,
    pub(crate) presence_change: Slot<PresenceChange>,
    pub(crate) dnd_updated_user: Slot<DndUpdatedUser>,
}

impl Handlers {
    /// No handlers registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the server has accepted the session.
    pub fn on_hello(mut self, handler: impl EventHandler<Hello>) -> Self {
        self.hello = Some(Arc::new(handler));
        self
    }

    /// Called for every visible channel message.
    pub fn on_message(mut self, handler: impl EventHandler<MessageEvent>) -> Self {
        self.message = Some(Arc::new(handler));
        self
    }

    /// Called after a pong has been recorded by the heartbeat.
    pub fn on_pong(mut self, handler: impl EventHandler<Pong>) -> Self {
        self.pong = Some(Arc::new(handler));
        self
    }

    /// Called when a team member's presence changes.
    pub fn on_presence_change(mut self, handler: impl EventHandler<PresenceChange>) -> Self {
        self.presence_change = Some(Arc::new(handler));
        self
    }

    /// Called when a team member's do-not-disturb settings change.
    pub fn on_dnd_updated_user(mut self, handler: impl EventHandler<DndUpdatedUser>) -> Self {
        self.dnd_updated_user = Some(Arc::new(handler));
        self
    }

    /// Whether a handler is registered for `kind`.
    pub fn is_registered(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Hello => self.hello.is_some(),
            EventKind::Message => self.message.is_some(),
            EventKind::Pong => self.pong.is_some(),
            EventKind::PresenceChange => self.presence_change.is_some(),
            EventKind::DndUpdatedUser => self.dnd_updated_user.is_some(),
        }
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("hello", &self.hello.is_some())
            .field("message", &self.message.is_some())
            .field("pong", &self.pong.is_some())
            .field("presence_change", &self.presence_change.is_some())
            .field("dnd_updated_user", &self.dnd_updated_user.is_some())
            .finish()
    }
}
