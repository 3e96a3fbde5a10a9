//! Pending call store.
//!
//! Maps the `messageId` of an outgoing call to whatever waits for its
//! response.
//!
//! Flow:
//! 1. The connector builds the request envelope
//! 2. It calls `register()` with the envelope's `messageId`
//! 3. It broadcasts the request
//! 4. The built-in `response` capability calls `complete()`
//! 5. Single-shot entries are removed on the first match; collectors stay
//!    until the caller closes them

use crate::message::Message;
use buzz_telemetry::{BUS_CALL_TIMEOUTS, BUS_PENDING_CALLS};
use buzz_types::MessageId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// What runs when a response arrives.
pub(crate) enum Continuation {
    /// Plain callback, invoked at most once.
    Callback(Box<dyn FnOnce(Message) + Send>),
    /// Awaited by `call_async`.
    Channel(oneshot::Sender<Message>),
    /// Receives every response until closed.
    Collector(mpsc::UnboundedSender<Message>),
}

impl Continuation {
    fn kind(&self) -> &'static str {
        match self {
            Self::Callback(_) => "callback",
            Self::Channel(_) => "channel",
            Self::Collector(_) => "collector",
        }
    }
}

/// A call waiting for its response
struct PendingCall {
    /// Locked so the store stays `Sync` with non-`Sync` callbacks inside
    continuation: Mutex<Continuation>,
    /// When the call was registered
    created_at: Instant,
    /// Message type of the request (for logging)
    message_type: String,
    /// Eviction deadline, if any
    timeout: Option<Duration>,
}

/// Statistics for the pending call store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total calls registered
    pub total_registered: AtomicU64,
    /// Total responses delivered to a continuation
    pub total_completed: AtomicU64,
    /// Total calls evicted by timeout
    pub total_timeouts: AtomicU64,
    /// Total calls cancelled or abandoned by their waiter
    pub total_cancelled: AtomicU64,
}

/// Outstanding calls of one connector.
#[derive(Default)]
pub struct PendingCalls {
    pending: DashMap<MessageId, PendingCall>,
    stats: PendingStats,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &self,
        message_id: MessageId,
        message_type: &str,
        continuation: Continuation,
        timeout: Option<Duration>,
    ) {
        debug!(
            message_id = %message_id,
            message_type = message_type,
            kind = continuation.kind(),
            "Registered pending call"
        );

        let call = PendingCall {
            continuation: Mutex::new(continuation),
            created_at: Instant::now(),
            message_type: message_type.to_string(),
            timeout,
        };
        if self.pending.insert(message_id, call).is_none() {
            BUS_PENDING_CALLS.inc();
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Hand a response to the call it answers.
    ///
    /// Returns true if a waiting continuation took the response.
    pub fn complete(&self, response: Message) -> bool {
        let Some(reply) = response.envelope().reply.clone() else {
            trace!("Response without reply id ignored");
            return false;
        };

        // Collectors stay registered; clone the sender out so no map guard
        // is held while user code runs.
        let collector = self
            .pending
            .get(&reply)
            .and_then(|call| {
                let continuation = call.continuation.lock();
                match &*continuation {
                    Continuation::Collector(sender) => Some(sender.clone()),
                    _ => None,
                }
            });
        if let Some(sender) = collector {
            return if sender.send(response).is_ok() {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                true
            } else {
                self.remove(&reply);
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                false
            };
        }

        let Some((_, call)) = self.pending.remove(&reply) else {
            trace!(reply = %reply, "Response for unknown or answered call");
            return false;
        };
        BUS_PENDING_CALLS.dec();

        debug!(
            message_id = %reply,
            message_type = call.message_type,
            response_time_ms = call.created_at.elapsed().as_millis(),
            "Completed pending call"
        );

        let delivered = match call.continuation.into_inner() {
            Continuation::Callback(callback) => {
                callback(response);
                true
            }
            Continuation::Channel(sender) => sender.send(response).is_ok(),
            Continuation::Collector(sender) => sender.send(response).is_ok(),
        };

        if delivered {
            self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            // Waiter gave up before the response arrived
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    /// Withdraw a pending call. Its continuation is dropped uninvoked.
    pub fn cancel(&self, message_id: &MessageId) -> bool {
        if self.remove(message_id) {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(message_id = %message_id, "Cancelled pending call");
            true
        } else {
            false
        }
    }

    /// Evict calls whose timeout elapsed.
    ///
    /// Returns the number of calls removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|id, call| {
            let Some(timeout) = call.timeout else {
                return true;
            };
            let elapsed = now.duration_since(call.created_at);
            if elapsed > timeout {
                warn!(
                    message_id = %id,
                    message_type = call.message_type,
                    elapsed_ms = elapsed.as_millis(),
                    timeout_ms = timeout.as_millis(),
                    "Evicting unanswered call"
                );
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            BUS_PENDING_CALLS.sub(removed as f64);
            BUS_CALL_TIMEOUTS.inc_by(removed as f64);
            self.stats
                .total_timeouts
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Record a timeout observed by an awaiting caller.
    pub(crate) fn expire(&self, message_id: &MessageId) {
        if self.remove(message_id) {
            BUS_CALL_TIMEOUTS.inc();
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, message_id: &MessageId) -> bool {
        self.pending.contains_key(message_id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    fn remove(&self, message_id: &MessageId) -> bool {
        if self.pending.remove(message_id).is_some() {
            BUS_PENDING_CALLS.dec();
            true
        } else {
            false
        }
    }
}

impl Drop for PendingCalls {
    fn drop(&mut self) {
        let remaining = self.pending.len();
        if remaining > 0 {
            BUS_PENDING_CALLS.sub(remaining as f64);
        }
    }
}
