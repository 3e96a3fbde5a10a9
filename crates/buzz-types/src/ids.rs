//! Identifiers used on the wire and between contexts.
//!
//! Connector and message ids share one generator: a random run prefix
//! (base 36) followed by a process-local counter, e.g. `k3x9-17`. The prefix
//! keeps ids from different processes apart, the counter keeps them unique
//! within one process.

use lazy_static::lazy_static;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

lazy_static! {
    static ref RUN_PREFIX: String = to_base36(rand::thread_rng().gen_range(0..=1_000_000));
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate the next bus-wide unique id (`<prefix>-<counter>`).
pub fn generate_id() -> String {
    format!(
        "{}-{}",
        RUN_PREFIX.as_str(),
        ID_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh id.
            pub fn generate() -> Self {
                Self(generate_id())
            }

            /// Borrow the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identity of a connector (`sender` / `receiver` on the wire).
    ConnectorId
);

string_id!(
    /// Identifier of a single envelope, used for reply correlation.
    MessageId
);

/// Identity of an execution context.
///
/// Transports annotate every delivery with the posting context's id; relays
/// rely on it to tell local traffic from traffic that crossed a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a new random context id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
