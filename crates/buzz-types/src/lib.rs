//! # Buzz Types Crate
//!
//! Wire-level types for the Buzz cross-context message bus.
//!
//! ## Design Principles
//!
//! - **Single Wire Entity**: The [`Envelope`] is the only thing that travels
//!   over a transport. Everything a peer knows about a message comes from it.
//! - **Envelope Identity**: `sender` is the sole source of identity. Payloads
//!   are caller-defined and never inspected for routing.
//! - **Forward Compatibility**: Unknown top-level envelope fields are kept
//!   verbatim so relays never strip data they do not understand.

pub mod envelope;
pub mod errors;
pub mod ids;

pub use envelope::{
    ControlNotice, Envelope, EnvelopeFields, MessageType, RENAME_LINK_COMMAND,
    REQUEST_LINK_COMMAND, ROOT_LINK, UPLINK_LINK,
};
pub use errors::{BusError, CodecError};
pub use ids::{generate_id, ConnectorId, ContextId, MessageId};
