//! Capability registry: message type → handler.

use crate::message::Message;
use buzz_types::MessageType;
use std::collections::HashMap;
use std::sync::Arc;

/// Something that handles one message type.
///
/// Any `Fn(Message) + Send + Sync` closure is a handler.
pub trait CapabilityHandler: Send + Sync {
    fn handle(&self, message: Message);
}

impl<F> CapabilityHandler for F
where
    F: Fn(Message) + Send + Sync,
{
    fn handle(&self, message: Message) {
        self(message)
    }
}

/// Handlers keyed by message type.
///
/// Registering a type twice replaces the earlier handler. Looking up an
/// unknown type yields `None`; the connector then drops the message.
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<MessageType, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `message_type`.
    ///
    /// Returns true if an earlier handler was replaced.
    pub fn register(
        &mut self,
        message_type: MessageType,
        handler: Arc<dyn CapabilityHandler>,
    ) -> bool {
        self.handlers
            .insert(message_type.normalized(), handler)
            .is_some()
    }

    pub fn lookup(&self, message_type: &MessageType) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(message_type).cloned()
    }

    /// Whether a handler is registered under the wire name `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&MessageType::from(name))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered wire names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().map(|t| t.as_str().to_string()).collect()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}
