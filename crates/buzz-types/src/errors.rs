//! # Error Types
//!
//! Errors used across bus components. None of them crosses the
//! fire-and-forget part of the public contract: codec failures mark foreign
//! traffic, bus errors only surface from awaited calls.

use crate::ids::MessageId;
use thiserror::Error;

/// Errors decoding or encoding transport text.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Text is not valid JSON, or does not fit the envelope shape.
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Text is valid JSON but not an object.
    #[error("Envelope is not a JSON object")]
    NotAnObject,
}

/// Errors from awaited calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// No response arrived within the call's timeout.
    #[error("Call {message_id} timed out after {timeout_ms}ms")]
    Timeout { message_id: MessageId, timeout_ms: u64 },

    /// The pending call was withdrawn before a response arrived.
    #[error("Call {message_id} was cancelled")]
    Cancelled { message_id: MessageId },
}
