//! # Buzz Envelope
//!
//! The universal wrapper for every message on the bus.
//!
//! ## Wire Format
//!
//! A JSON object with camelCase keys:
//!
//! ```text
//! {
//!   "link": "buzzRoot",          logical channel
//!   "type": "open-document",     capability being invoked
//!   "sender": "k3x9-4",          originating connector
//!   "senderName": "viewer",
//!   "receiver": "k3x9-2",        optional, targets a single connector
//!   "messageId": "k3x9-17",
//!   "reply": "k3x9-12",          only on `response` envelopes
//!   "payload": { ... },
//!   "relayed": true              only on messages relayed upward
//! }
//! ```
//!
//! Unknown top-level keys are kept in [`Envelope::extra`] and written back
//! unchanged.

use crate::ids::{ConnectorId, MessageId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Link every connector joins unless configured otherwise.
pub const ROOT_LINK: &str = "buzzRoot";

/// Reserved link used only while a message travels from a child context to
/// its parent. Application code must never join it.
pub const UPLINK_LINK: &str = "uplink";

/// Command name of the control notice a downlink posts into its child.
pub const RENAME_LINK_COMMAND: &str = "rename-buzz-link";

/// Command name of the control notice an uplink posts into its parent to
/// have the bridged link announced again.
pub const REQUEST_LINK_COMMAND: &str = "request-buzz-link";

/// Message type of an envelope.
///
/// The two protocol types are reserved; everything else is an application
/// capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `has-capability`: asks peers whether they handle a named capability.
    HasCapability,
    /// `response`: answers an earlier call.
    Response,
    /// Application-defined capability.
    Custom(String),
}

impl MessageType {
    pub const HAS_CAPABILITY: &'static str = "has-capability";
    pub const RESPONSE: &'static str = "response";

    /// Wire name of this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::HasCapability => Self::HAS_CAPABILITY,
            Self::Response => Self::RESPONSE,
            Self::Custom(name) => name,
        }
    }

    /// Returns true for the protocol-reserved types.
    pub fn is_reserved(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Re-parse a possibly hand-built value so `Custom("response")` and
    /// `Response` compare equal.
    pub fn normalized(self) -> Self {
        match self {
            Self::Custom(name) => Self::from(name.as_str()),
            other => other,
        }
    }
}

impl From<&str> for MessageType {
    fn from(value: &str) -> Self {
        match value {
            Self::HAS_CAPABILITY => Self::HasCapability,
            Self::RESPONSE => Self::Response,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bus message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Logical channel. Connectors on other links never see the message.
    pub link: String,

    /// Capability being invoked.
    #[serde(rename = "type", default)]
    pub message_type: String,

    /// Identity of the originating connector.
    #[serde(default)]
    pub sender: ConnectorId,

    /// Display name of the originating connector.
    #[serde(default)]
    pub sender_name: String,

    /// When set, only the connector with this identity accepts the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ConnectorId>,

    /// Unique id of this envelope.
    #[serde(default)]
    pub message_id: MessageId,

    /// For `response` envelopes: the `message_id` being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<MessageId>,

    /// Caller-defined data.
    #[serde(default)]
    pub payload: Value,

    /// Set by a downlink on messages it relayed upward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relayed: Option<bool>,

    /// Unknown fields, preserved across decode/encode.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Create an envelope with the addressing fields every message needs.
    pub fn new(
        link: impl Into<String>,
        message_type: &MessageType,
        sender: ConnectorId,
        sender_name: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            link: link.into(),
            message_type: message_type.as_str().to_string(),
            sender,
            sender_name: sender_name.into(),
            receiver: None,
            message_id: MessageId::generate(),
            reply: None,
            payload,
            relayed: None,
            extra: Map::new(),
        }
    }

    /// Typed view of the `type` field.
    pub fn kind(&self) -> MessageType {
        MessageType::from(self.message_type.as_str())
    }

    /// Whether a downlink already relayed this message upward.
    pub fn is_relayed(&self) -> bool {
        self.relayed.unwrap_or(false)
    }

    /// Copy the caller-supplied fields onto this envelope.
    pub fn apply_fields(&mut self, fields: EnvelopeFields) {
        self.receiver = fields.receiver;
        self.reply = fields.reply;
        for (key, value) in fields.extra {
            self.extra.insert(key, value);
        }
    }

    /// Merge `extensions` into the payload object.
    ///
    /// A null payload becomes an object. Any other non-object payload is left
    /// untouched and `false` is returned.
    pub fn merge_into_payload(&mut self, extensions: &Map<String, Value>) -> bool {
        if extensions.is_empty() {
            return true;
        }
        if self.payload.is_null() {
            self.payload = Value::Object(Map::new());
        }
        match &mut self.payload {
            Value::Object(map) => {
                for (key, value) in extensions {
                    map.insert(key.clone(), value.clone());
                }
                true
            }
            _ => false,
        }
    }
}

/// Partial envelope supplied by callers of `send_message` / `call`.
///
/// Addressing fields owned by the connector (`link`, `sender`, `messageId`,
/// `type`) are always overwritten; only these can be chosen by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvelopeFields {
    pub receiver: Option<ConnectorId>,
    pub reply: Option<MessageId>,
    pub extra: Map<String, Value>,
}

impl EnvelopeFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a single connector.
    #[must_use]
    pub fn to(mut self, receiver: impl Into<ConnectorId>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    /// Mark as the answer to `message_id`.
    #[must_use]
    pub fn replying_to(mut self, message_id: MessageId) -> Self {
        self.reply = Some(message_id);
        self
    }

    /// Attach an extra top-level field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Out-of-band notice exchanged between an uplink and its downlink.
///
/// Not an envelope: connectors ignore it (empty `type`). A downlink sends
/// `rename-buzz-link` into its child; an uplink sends `request-buzz-link`
/// (empty `link`) into its parent when it is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlNotice {
    pub command: String,
    pub link: String,
}

impl ControlNotice {
    /// Tell the child which parent link its root traffic is bridged to.
    pub fn rename_link(link: impl Into<String>) -> Self {
        Self {
            command: RENAME_LINK_COMMAND.to_string(),
            link: link.into(),
        }
    }

    /// Ask the parent's downlink to announce its link again.
    pub fn request_link() -> Self {
        Self {
            command: REQUEST_LINK_COMMAND.to_string(),
            link: String::new(),
        }
    }

    pub fn is_rename(&self) -> bool {
        self.command == RENAME_LINK_COMMAND
    }

    pub fn is_request(&self) -> bool {
        self.command == REQUEST_LINK_COMMAND
    }
}
