// crates/command-gate-gateway/src/channel.rs
// ============================================================================
// Module: Message Channel
// Description: Abstract bidirectional message channel consumed by the gateway.
// Purpose: Decouple the gateway from whatever transport delivers messages.
// Dependencies: tokio, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`MessageChannel`] delivers [`ChannelEvent`]s into an mpsc sender handed
//! over at subscription time and returns a [`Subscription`] that stops
//! delivery. Each event carries untrusted data, the sender's origin, an
//! opaque source identity, and a [`Responder`] for the reply.
//!
//! [`InMemoryChannel`] is an in-process implementation used for embedding
//! and tests: [`InMemoryChannel::request`] posts a message and awaits the
//! reply, resolving to `None` when the gateway chose not to answer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Opaque identity of the party that posted a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    /// Wraps a transport-specific identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reply path for one inbound event.
pub trait Responder: Send + Sync {
    /// Sends a reply. Delivery failures are the transport's concern.
    fn respond(&self, message: Value);
}

/// One inbound message.
#[derive(Clone)]
pub struct ChannelEvent {
    /// Untrusted message data.
    pub data: Value,
    /// Origin reported by the transport.
    pub origin: String,
    /// Identity of the posting party.
    pub source: SourceId,
    /// Reply path.
    pub responder: Arc<dyn Responder>,
}

impl ChannelEvent {
    /// Sends a reply for this event.
    pub fn respond(&self, message: Value) {
        self.responder.respond(message);
    }
}

impl fmt::Debug for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEvent")
            .field("origin", &self.origin)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Channel failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Subscription could not be established.
    #[error("channel subscribe failed: {0}")]
    Subscribe(String),
    /// Channel I/O failure.
    #[error("channel io error: {0}")]
    Io(String),
}

/// Active subscription; dropping it does not unsubscribe.
pub trait Subscription: Send {
    /// Stops event delivery.
    fn unsubscribe(self: Box<Self>);
}

/// Abstract message channel.
pub trait MessageChannel: Send + Sync {
    /// Starts delivering events into `events`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] when the subscription cannot be established.
    fn subscribe(
        &self,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Box<dyn Subscription>, ChannelError>;
}

// ============================================================================
// SECTION: In-Memory Channel
// ============================================================================

/// Responder that resolves a oneshot with the first reply.
struct OneshotResponder {
    /// Pending reply sender.
    reply: Mutex<Option<oneshot::Sender<Value>>>,
}

impl Responder for OneshotResponder {
    fn respond(&self, message: Value) {
        let sender = self.reply.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sender) = sender {
            let _ = sender.send(message);
        }
    }
}

/// Subscriber list shared between the channel and its subscriptions.
type Subscribers = Arc<Mutex<Vec<(u64, mpsc::UnboundedSender<ChannelEvent>)>>>;

/// In-process message channel.
#[derive(Default)]
pub struct InMemoryChannel {
    /// Active subscribers keyed by subscription id.
    subscribers: Subscribers,
    /// Next subscription id.
    next_id: Mutex<u64>,
}

impl InMemoryChannel {
    /// Creates a channel with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Posts a message and awaits the first reply.
    ///
    /// Resolves to `None` when no subscriber answered.
    pub async fn request(&self, data: Value, origin: &str, source: &SourceId) -> Option<Value> {
        let (sender, receiver) = oneshot::channel();
        let responder: Arc<dyn Responder> = Arc::new(OneshotResponder {
            reply: Mutex::new(Some(sender)),
        });
        let event = ChannelEvent {
            data,
            origin: origin.to_string(),
            source: source.clone(),
            responder,
        };
        let delivered = {
            let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers.iter().filter(|(_, tx)| tx.send(event.clone()).is_ok()).count()
        };
        drop(event);
        if delivered == 0 {
            return None;
        }
        receiver.await.ok()
    }
}

impl MessageChannel for InMemoryChannel {
    fn subscribe(
        &self,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Box<dyn Subscription>, ChannelError> {
        let id = {
            let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next_id += 1;
            *next_id
        };
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).push((id, events));
        Ok(Box::new(InMemorySubscription {
            id,
            subscribers: Arc::clone(&self.subscribers),
        }))
    }
}

/// Subscription handle for [`InMemoryChannel`].
struct InMemorySubscription {
    /// Subscription id.
    id: u64,
    /// Shared subscriber list.
    subscribers: Subscribers,
}

impl Subscription for InMemorySubscription {
    fn unsubscribe(self: Box<Self>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _)| *id != self.id);
    }
}
