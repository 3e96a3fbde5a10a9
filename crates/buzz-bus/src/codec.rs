//! Envelope codec.
//!
//! The transport is shared with unrelated traffic, so decoding is the only
//! gate between noise and the bus. Anything that is not a JSON object with a
//! string `link` is not a bus message; callers drop it without a word.

use buzz_types::{CodecError, ControlNotice, Envelope};
use serde_json::Value;

/// Serialize an envelope to transport text.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Parse transport text into an envelope.
pub fn decode(text: &str) -> Result<Envelope, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(CodecError::NotAnObject);
    }
    Ok(serde_json::from_value(value)?)
}

/// Parse a relay control notice. Returns `None` for anything else.
pub fn decode_notice(text: &str) -> Option<ControlNotice> {
    serde_json::from_str::<ControlNotice>(text)
        .ok()
        .filter(|notice| notice.is_rename() || notice.is_request())
}

/// Serialize a control notice.
pub fn encode_notice(notice: &ControlNotice) -> Result<String, CodecError> {
    Ok(serde_json::to_string(notice)?)
}
