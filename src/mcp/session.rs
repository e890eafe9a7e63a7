//! Session lifecycle: request classification, session registry, and the
//! per-session handle.
//!
//! A *session* groups the logically related interactions between one MCP
//! client and this gateway, starting from the `initialize` handshake. The
//! server assigns each session an opaque identifier (returned via the
//! `Mcp-Session-Id` response header) and the client includes it on every
//! subsequent request. The [`SessionRegistry`] is the only shared mutable
//! state in the process; its lock is held for map operations only, never
//! across an await, so a slow call on one session cannot block routing for
//! another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::mpsc;

use crate::mcp::engine::{is_initialize_message, Engine};
use crate::mcp::types::{JsonRpcMessage, JsonRpcNotification};

/// Routing decision for one inbound HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Header carries an identifier with a live session record.
    Continue(String),
    /// No session header, payload is an `initialize` request.
    Initialize,
    /// Anything else: unknown id, stale id on an initialize payload, or a
    /// continuation payload without an id.
    Reject,
}

/// Classify an inbound call. The header check wins over payload inspection:
/// a client-supplied identifier that is not live is rejected even when the
/// payload is an `initialize` request, so stale or injected ids can never
/// seed a fresh session.
pub fn classify(
    session_id: Option<&str>,
    message: &JsonRpcMessage,
    registry: &SessionRegistry,
) -> RouteDecision {
    match session_id {
        Some(id) if registry.contains(id) => RouteDecision::Continue(id.to_string()),
        Some(_) => RouteDecision::Reject,
        None if is_initialize_message(message) => RouteDecision::Initialize,
        None => RouteDecision::Reject,
    }
}

type CloseCallback = Box<dyn FnOnce() + Send>;

/// One live session: the engine bound to one logical client, plus the
/// server-push channel and the close bookkeeping.
pub struct SessionHandle {
    id: String,
    engine: Engine,
    closed: AtomicBool,
    on_close: Mutex<Option<CloseCallback>>,
    push_tx: mpsc::UnboundedSender<JsonRpcMessage>,
    push_rx: Mutex<Option<mpsc::UnboundedReceiver<JsonRpcMessage>>>,
}

impl SessionHandle {
    fn new(id: String, engine: Engine, on_close: CloseCallback) -> Self {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        Self {
            id,
            engine,
            closed: AtomicBool::new(false),
            on_close: Mutex::new(Some(on_close)),
            push_tx,
            push_rx: Mutex::new(Some(push_rx)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queue a server-initiated notification onto the session's push stream.
    pub fn push(&self, notification: JsonRpcNotification) {
        let _ = self.push_tx.send(JsonRpcMessage::Notification(notification));
    }

    /// Take the server-push receiver for the GET stream. `None` while
    /// another stream holds it; dropping the returned [`PushStream`] hands
    /// the receiver back so a reconnecting client can re-attach. Queued
    /// notifications survive the gap in the channel.
    pub fn take_push_stream(self: &Arc<Self>) -> Option<PushStream> {
        let rx = self
            .push_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;
        Some(PushStream {
            handle: self.clone(),
            rx: Some(rx),
        })
    }

    /// Tear the session down. Idempotent: the close callback (which detaches
    /// the session from the registry) runs exactly once, no matter how many
    /// close signals race in.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = self
            .on_close
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(callback) = callback {
            callback();
        }
        tracing::debug!(session_id = %self.id, "session closed");
    }
}

/// Exclusive hold on a session's server-push receiver, restored to the
/// session when dropped.
pub struct PushStream {
    handle: Arc<SessionHandle>,
    rx: Option<mpsc::UnboundedReceiver<JsonRpcMessage>>,
}

impl PushStream {
    /// Next queued server-push message; `None` once the session closes.
    pub async fn recv(&mut self) -> Option<JsonRpcMessage> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for PushStream {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            if !self.handle.is_closed() {
                *self
                    .handle
                    .push_rx
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(rx);
            }
        }
    }
}

/// Process-wide mapping from session identifier to session handle.
///
/// Constructed at server start and injected into the HTTP adapter; never a
/// bare global, so tests can run several independent registries in-process.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a fully constructed engine under a fresh identifier and
    /// return the handle. The identifier only becomes visible once the
    /// handle is complete, so no lookup can observe a partially initialized
    /// session. Identifier collisions are retried with a new draw, never
    /// overwritten.
    pub fn create(self: &Arc<Self>, engine: Engine) -> Arc<SessionHandle> {
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            if sessions.contains_key(&id) {
                continue;
            }

            let registry: Weak<SessionRegistry> = Arc::downgrade(self);
            let callback_id = id.clone();
            let handle = Arc::new(SessionHandle::new(
                id.clone(),
                engine,
                Box::new(move || {
                    if let Some(registry) = registry.upgrade() {
                        registry.detach(&callback_id);
                    }
                }),
            ));
            sessions.insert(id, handle.clone());
            tracing::debug!(session_id = %handle.id(), total = sessions.len(), "session created");
            return handle;
        }
    }

    /// Look up a live session. Absence is a normal outcome, not an error.
    pub fn lookup(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Remove and close a session. Idempotent: removing an absent id is a
    /// no-op.
    pub fn remove(&self, id: &str) {
        let handle = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        if let Some(handle) = handle {
            handle.close();
        }
    }

    /// Drop the map entry without driving the close path; called from the
    /// close callback itself.
    fn detach(&self, id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
