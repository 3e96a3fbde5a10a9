//! Prometheus metrics for the bus.
//!
//! All metrics follow the naming convention: `buzz_<area>_<metric>_<unit>`
//!
//! Counters are live from first use; [`register_metrics`] only makes them
//! visible through [`REGISTRY`].

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Envelopes posted by connectors
    pub static ref BUS_MESSAGES_SENT: Counter = Counter::new(
        "buzz_bus_messages_sent_total",
        "Total envelopes posted by connectors"
    ).expect("metric creation failed");

    /// Envelopes handed to a capability handler
    pub static ref BUS_MESSAGES_DISPATCHED: Counter = Counter::new(
        "buzz_bus_messages_dispatched_total",
        "Total envelopes dispatched to a capability handler"
    ).expect("metric creation failed");

    /// Envelopes dropped by a connector
    pub static ref BUS_MESSAGES_DROPPED: CounterVec = CounterVec::new(
        Opts::new("buzz_bus_messages_dropped_total", "Total envelopes dropped by connectors"),
        &["reason"]  // malformed, unroutable, unhandled
    ).expect("metric creation failed");

    /// Envelopes rewritten and forwarded across a context boundary
    pub static ref BUS_MESSAGES_RELAYED: CounterVec = CounterVec::new(
        Opts::new("buzz_relay_messages_total", "Total envelopes forwarded across a context boundary"),
        &["direction"]  // uplink, downlink_up, downlink_down
    ).expect("metric creation failed");

    /// Calls waiting for a response
    pub static ref BUS_PENDING_CALLS: Gauge = Gauge::new(
        "buzz_bus_pending_calls",
        "Calls currently waiting for a response"
    ).expect("metric creation failed");

    /// Calls evicted without a response
    pub static ref BUS_CALL_TIMEOUTS: Counter = Counter::new(
        "buzz_bus_call_timeouts_total",
        "Total calls evicted after their timeout elapsed"
    ).expect("metric creation failed");
}

/// Drop reasons used as the `reason` label.
pub mod drop_reason {
    pub const MALFORMED: &str = "malformed";
    pub const UNROUTABLE: &str = "unroutable";
    pub const UNHANDLED: &str = "unhandled";
}

/// Relay directions used as the `direction` label.
pub mod relay_direction {
    pub const UPLINK: &str = "uplink";
    pub const DOWNLINK_UP: &str = "downlink_up";
    pub const DOWNLINK_DOWN: &str = "downlink_down";
}

/// Handle proving metrics were registered.
pub struct MetricsHandle {
    registry: &'static Registry,
}

impl MetricsHandle {
    pub fn registry(&self) -> &'static Registry {
        self.registry
    }
}

/// Register all bus metrics with [`REGISTRY`].
///
/// Safe to call more than once: already-registered collectors are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BUS_MESSAGES_SENT.clone()),
        Box::new(BUS_MESSAGES_DISPATCHED.clone()),
        Box::new(BUS_MESSAGES_DROPPED.clone()),
        Box::new(BUS_MESSAGES_RELAYED.clone()),
        Box::new(BUS_PENDING_CALLS.clone()),
        Box::new(BUS_CALL_TIMEOUTS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: &REGISTRY,
    })
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather_text() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
