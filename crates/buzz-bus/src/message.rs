//! Handler-side view of a received envelope.

use crate::connector::ConnectorInner;
use buzz_types::{ConnectorId, Envelope, EnvelopeFields, MessageId, MessageType};
use serde_json::Value;
use std::sync::Arc;

/// A received envelope, bound to the connector that accepted it.
#[derive(Clone)]
pub struct Message {
    connector: Arc<ConnectorInner>,
    envelope: Envelope,
}

impl Message {
    pub(crate) fn new(connector: Arc<ConnectorInner>, envelope: Envelope) -> Self {
        Self {
            connector,
            envelope,
        }
    }

    pub fn payload(&self) -> &Value {
        &self.envelope.payload
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }

    /// Identity of the connector that sent this message.
    pub fn sender(&self) -> &ConnectorId {
        &self.envelope.sender
    }

    /// Identity of the connector that received this message.
    pub fn receiver_uid(&self) -> &ConnectorId {
        self.connector.uid()
    }

    /// Answer this message.
    ///
    /// Sends a `response` envelope addressed to the original sender and
    /// carrying the original `messageId` in `reply`.
    pub fn reply(&self, payload: Value) -> MessageId {
        let fields = EnvelopeFields::new()
            .to(self.envelope.sender.clone())
            .replying_to(self.envelope.message_id.clone());
        self.connector
            .send_message(&MessageType::Response, fields, payload)
    }

    pub(crate) fn connector(&self) -> &Arc<ConnectorInner> {
        &self.connector
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("connector", self.connector.uid())
            .field("envelope", &self.envelope)
            .finish()
    }
}
