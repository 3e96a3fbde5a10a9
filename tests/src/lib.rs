//! # Buzz Test Suite
//!
//! Cross-context flows that need more than one crate or more than one
//! context to observe.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── relay_flows.rs       # Uplink/downlink transparency, nesting depth
//!     ├── discovery_flows.rs   # Capability queries across relays
//!     └── robustness.rs        # Foreign traffic, unknown fields, telemetry
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p buzz-tests
//! cargo test -p buzz-tests integration::relay_flows::
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
