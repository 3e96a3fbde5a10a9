//! # Broadcast Transport
//!
//! The medium every context shares. It delivers text to every listener of one
//! context, tagged with the identity of the posting context, and nothing
//! more: no addressing, no queuing guarantees, no backpressure.
//!
//! [`InMemoryTransport`] backs each context with a `tokio::sync::broadcast`
//! channel. A host embedding the bus over another medium implements
//! [`Transport`] and must preserve the source identity on every delivery;
//! relays depend on it.

use buzz_types::ContextId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// One piece of text seen by a listener.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Raw transport text. May or may not be a bus envelope.
    pub text: Arc<str>,
    /// Context that posted the text.
    pub source: ContextId,
}

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The transport was dropped.
    #[error("Transport closed")]
    Closed,
}

/// Broadcast medium of a single execution context.
pub trait Transport: Send + Sync {
    /// Deliver `text` to every current listener.
    ///
    /// Returns the number of listeners reached.
    fn post(&self, text: String, source: ContextId) -> usize;

    /// Register a new listener.
    fn subscribe(&self) -> Subscription;

    /// Number of live listeners.
    fn listener_count(&self) -> usize;
}

/// In-memory transport on top of `tokio::sync::broadcast`.
pub struct InMemoryTransport {
    sender: broadcast::Sender<Delivery>,
    posted: AtomicU64,
    capacity: usize,
}

impl InMemoryTransport {
    /// Create a transport with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(crate::DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a transport buffering at most `capacity` undelivered messages
    /// per listener. Slow listeners skip what they missed.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            posted: AtomicU64::new(0),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total texts posted, including those nobody heard.
    #[must_use]
    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for InMemoryTransport {
    fn post(&self, text: String, source: ContextId) -> usize {
        self.posted.fetch_add(1, Ordering::Relaxed);
        let delivery = Delivery {
            text: Arc::from(text),
            source,
        };
        match self.sender.send(delivery) {
            Ok(listeners) => listeners,
            Err(_) => {
                trace!(source = %source, "Posted with no listeners");
                0
            }
        }
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.sender.subscribe())
    }

    fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A listener on a transport.
///
/// Dropping it unregisters the listener.
pub struct Subscription {
    receiver: broadcast::Receiver<Delivery>,
}

impl Subscription {
    /// Wrap a raw broadcast receiver. Used by custom [`Transport`]s.
    pub fn new(receiver: broadcast::Receiver<Delivery>) -> Self {
        Self { receiver }
    }

    /// Receive the next delivery.
    ///
    /// Returns `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            match self.receiver.recv().await {
                Ok(delivery) => return Some(delivery),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Listener lagged, deliveries dropped");
                }
            }
        }
    }

    /// Receive without waiting.
    ///
    /// - `Ok(Some(delivery))` - A delivery was available
    /// - `Ok(None)` - Nothing pending
    /// - `Err(SubscriptionError::Closed)` - The transport was dropped
    pub fn try_recv(&mut self) -> Result<Option<Delivery>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(delivery) => return Ok(Some(delivery)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            }
        }
    }
}
