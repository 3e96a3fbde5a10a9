//! Passive bus observer.

use crate::codec;
use crate::context::Context;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Logs every envelope seen in one context. Never affects routing.
pub struct Debugger {
    observed: Arc<AtomicU64>,
    listener: JoinHandle<()>,
}

impl Debugger {
    /// Start observing `context`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(context: &Arc<Context>) -> Self {
        let observed = Arc::new(AtomicU64::new(0));
        let mut subscription = context.subscribe();
        let counter = Arc::clone(&observed);
        let context_id = context.id();

        let listener = tokio::spawn(async move {
            while let Some(delivery) = subscription.recv().await {
                let Ok(envelope) = codec::decode(&delivery.text) else {
                    continue;
                };
                if envelope.link.is_empty() {
                    continue;
                }
                counter.fetch_add(1, Ordering::Relaxed);
                info!(
                    target: "buzz::debugger",
                    context = %context_id,
                    source = %delivery.source,
                    link = %envelope.link,
                    message_type = %envelope.message_type,
                    sender = %envelope.sender,
                    sender_name = %envelope.sender_name,
                    payload = %envelope.payload,
                    "Buzz message on {} from {}",
                    envelope.link,
                    envelope.sender
                );
            }
        });

        Self { observed, listener }
    }

    /// Envelopes logged so far.
    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
