//! # Buzz Bus - Link-Addressed Messaging Across Nested Contexts
//!
//! Connectors in any number of isolated execution contexts exchange typed
//! JSON envelopes over named links. Relays bridge nested contexts so a
//! connector never needs to know where its peers live.
//!
//! ## Layout
//!
//! ```text
//!  ┌──────────────────────── parent context ───────────────────────┐
//!  │  Connector ──post──▶ ┌───────────┐ ──deliver──▶ Connector     │
//!  │                      │ Transport │                             │
//!  │  Debugger  ◀──────── └───────────┘ ◀──────────▶ Downlink ──┐   │
//!  └────────────────────────────────────────────────────────────┼───┘
//!                                                               │
//!  ┌──────────────────────── child context ─────────────────────┼───┐
//!  │  Connector ◀──────▶ ┌───────────┐ ◀──────────▶ Uplink ─────┘   │
//!  │                     │ Transport │                              │
//!  │                     └───────────┘                              │
//!  └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - Every listener in a context sees every post; filtering is by link,
//!   sender and receiver on the envelope.
//! - A connector never handles its own messages.
//! - `has-capability` and `response` are reserved types handled by every
//!   connector.
//! - [`init`] installs at most one uplink per context and signals readiness
//!   once.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod capability;
pub mod codec;
pub mod config;
pub mod connector;
pub mod context;
pub mod debugger;
pub mod filter;
pub mod message;
pub mod pending;
pub mod relay;
pub mod runtime;
pub mod transport;

// Re-export main types
pub use capability::{CapabilityHandler, CapabilityRegistry};
pub use config::BusConfig;
pub use connector::{CapabilityAck, CapabilityDiscovery, Connector, ConnectorOptions};
pub use context::Context;
pub use debugger::Debugger;
pub use filter::EnvelopeFilter;
pub use message::Message;
pub use pending::{PendingCalls, PendingStats};
pub use relay::{Downlink, DownlinkOptions, Uplink};
pub use runtime::init;
pub use transport::{Delivery, InMemoryTransport, Subscription, SubscriptionError, Transport};

pub use buzz_types::{
    BusError, CodecError, ContextId, Envelope, EnvelopeFields, MessageId, MessageType,
    ConnectorId, ROOT_LINK, UPLINK_LINK,
};

/// Messages buffered per listener before the slowest one starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// How often a connector evicts expired pending calls.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1000;
