//! In-process message bus between extension contexts
//!
//! Each context (a tab's page agent, or the background runtime) binds one
//! `Inbox`. Senders get exactly one response per request, or an error when
//! nobody is listening or the listener drops the request unanswered.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::core::messages::{Message, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Page agent attached to a tab
    Tab(TabId),
    /// Background service
    Runtime,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tab(id) => id.fmt(f),
            Target::Runtime => f.write_str("runtime"),
        }
    }
}

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("could not establish connection: no listener bound for {target}")]
    Unreachable { target: String },

    #[error("message port closed before a response was received")]
    NoResponse,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl MessagingError {
    fn unreachable(target: impl fmt::Display) -> Self {
        MessagingError::Unreachable {
            target: target.to_string(),
        }
    }
}

/// One in-flight request
#[derive(Debug)]
pub struct Envelope {
    pub request: Value,
    reply: oneshot::Sender<Value>,
}

impl Envelope {
    /// Answer the request. Dropping the envelope instead leaves the sender
    /// with `NoResponse`.
    pub fn respond(self, response: Response) {
        match serde_json::to_value(response) {
            Ok(value) => {
                // Sender may have given up already
                let _ = self.reply.send(value);
            }
            Err(e) => warn!("Failed to encode response: {}", e),
        }
    }
}

/// Receiving side of a context's listener
#[derive(Debug)]
pub struct Inbox {
    target: Target,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Inbox {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Handles decoded messages for a context. Returning None sends no response.
pub trait MessageHandler {
    fn handle(&mut self, message: Message) -> Option<Response>;
}

/// Drive a handler until its inbox closes
pub async fn serve<H: MessageHandler>(mut inbox: Inbox, handler: &mut H) {
    while let Some(envelope) = inbox.recv().await {
        dispatch(handler, envelope);
    }
    debug!("Listener for {} stopped", inbox.target);
}

/// Decode one envelope and pass it to the handler
pub fn dispatch<H: MessageHandler + ?Sized>(handler: &mut H, envelope: Envelope) {
    let Some(message) = Message::decode(&envelope.request) else {
        return;
    };
    if let Some(response) = handler.handle(message) {
        envelope.respond(response);
    }
}

#[derive(Default)]
struct BusInner {
    listeners: HashMap<Target, mpsc::UnboundedSender<Envelope>>,
    tabs: Vec<TabId>,
    active_tab: Option<TabId>,
    next_tab: u32,
}

/// Shared handle to the bus; cheap to clone
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<Mutex<BusInner>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a new tab and focus it
    pub fn open_tab(&self) -> TabId {
        let mut inner = self.lock();
        inner.next_tab += 1;
        let id = TabId(inner.next_tab);
        inner.tabs.push(id);
        inner.active_tab = Some(id);
        debug!("Opened {}", id);
        id
    }

    /// Focus an open tab. Returns false for unknown tabs.
    pub fn focus(&self, tab: TabId) -> bool {
        let mut inner = self.lock();
        if inner.tabs.contains(&tab) {
            inner.active_tab = Some(tab);
            true
        } else {
            false
        }
    }

    /// Close a tab and drop its listener
    pub fn close_tab(&self, tab: TabId) {
        let mut inner = self.lock();
        inner.tabs.retain(|t| *t != tab);
        inner.listeners.remove(&Target::Tab(tab));
        if inner.active_tab == Some(tab) {
            inner.active_tab = inner.tabs.last().copied();
        }
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.lock().active_tab
    }

    /// Bind the listener for a context, replacing any previous one
    pub fn listen(&self, target: Target) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.lock().listeners.insert(target, tx).is_some() {
            debug!("Replaced listener for {}", target);
        }
        Inbox { target, rx }
    }

    pub fn is_listening(&self, target: Target) -> bool {
        self.lock()
            .listeners
            .get(&target)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Send a message and wait for its single response
    pub async fn send(&self, target: Target, message: &Message) -> Result<Response, MessagingError> {
        let raw = self.send_raw(target, message.encode()?).await?;
        serde_json::from_value(raw).map_err(|e| {
            warn!("Undecodable response from {}: {}", target, e);
            MessagingError::NoResponse
        })
    }

    /// Send to whichever tab has focus
    pub async fn send_to_active_tab(&self, message: &Message) -> Result<Response, MessagingError> {
        let tab = self
            .active_tab()
            .ok_or_else(|| MessagingError::unreachable("active tab"))?;
        self.send(Target::Tab(tab), message).await
    }

    /// Send an already-encoded request
    pub async fn send_raw(&self, target: Target, request: Value) -> Result<Value, MessagingError> {
        let tx = self
            .lock()
            .listeners
            .get(&target)
            .cloned()
            .ok_or_else(|| MessagingError::unreachable(target))?;

        let (reply, response) = oneshot::channel();
        tx.send(Envelope { request, reply })
            .map_err(|_| MessagingError::unreachable(target))?;

        response.await.map_err(|_| MessagingError::NoResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo {
        seen: Vec<Message>,
    }

    impl MessageHandler for Echo {
        fn handle(&mut self, message: Message) -> Option<Response> {
            self.seen.push(message.clone());
            match message {
                Message::CheckState => Some(Response::state(false)),
                Message::CosmicTelemetry(_) => None,
                _ => Some(Response::ok()),
            }
        }
    }

    fn spawn_echo(bus: &MessageBus, target: Target) -> tokio::task::JoinHandle<Vec<Message>> {
        let inbox = bus.listen(target);
        tokio::spawn(async move {
            let mut echo = Echo { seen: Vec::new() };
            serve(inbox, &mut echo).await;
            echo.seen
        })
    }

    #[tokio::test]
    async fn test_send_to_unbound_tab_is_unreachable() {
        let bus = MessageBus::new();
        let tab = bus.open_tab();
        let err = bus
            .send(Target::Tab(tab), &Message::CheckState)
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_send_without_active_tab_is_unreachable() {
        let bus = MessageBus::new();
        let err = bus.send_to_active_tab(&Message::CheckState).await.unwrap_err();
        assert!(matches!(err, MessagingError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let bus = MessageBus::new();
        let tab = bus.open_tab();
        let handle = spawn_echo(&bus, Target::Tab(tab));

        let response = bus.send_to_active_tab(&Message::CheckState).await.unwrap();
        assert_eq!(response, Response::state(false));

        let response = bus
            .send(Target::Tab(tab), &Message::ChangeGalaxy("nebula".into()))
            .await
            .unwrap();
        assert_eq!(response, Response::ok());

        bus.close_tab(tab);
        let seen = handle.await.unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_action_gets_no_response() {
        let bus = MessageBus::new();
        let handle = spawn_echo(&bus, Target::Runtime);

        let err = bus
            .send_raw(Target::Runtime, json!({"action": "backgroundTask"}))
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::NoResponse));

        // Handler chose not to answer
        let err = bus
            .send(Target::Runtime, &Message::CosmicTelemetry(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::NoResponse));

        drop(bus);
        // Unknown action never reached the handler
        let seen = handle.await.unwrap();
        assert_eq!(seen, vec![Message::CosmicTelemetry(json!({}))]);
    }

    #[tokio::test]
    async fn test_dropped_listener_is_unreachable() {
        let bus = MessageBus::new();
        let tab = bus.open_tab();
        let inbox = bus.listen(Target::Tab(tab));
        assert!(bus.is_listening(Target::Tab(tab)));
        drop(inbox);
        assert!(!bus.is_listening(Target::Tab(tab)));

        let err = bus.send(Target::Tab(tab), &Message::CheckState).await.unwrap_err();
        assert!(matches!(err, MessagingError::Unreachable { .. }));
    }

    #[test]
    fn test_tab_focus_follows_close() {
        let bus = MessageBus::new();
        let first = bus.open_tab();
        let second = bus.open_tab();
        assert_eq!(bus.active_tab(), Some(second));

        assert!(bus.focus(first));
        assert!(!bus.focus(TabId(99)));
        bus.close_tab(first);
        assert_eq!(bus.active_tab(), Some(second));
        bus.close_tab(second);
        assert_eq!(bus.active_tab(), None);
    }
}
