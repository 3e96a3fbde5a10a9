//! # Buzz Telemetry
//!
//! Logging and metrics for the Buzz bus.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use buzz_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! // bus components now log through `tracing` and count through Prometheus
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BUZZ_SERVICE_NAME` | `buzz` | Service name in log output |
//! | `BUZZ_LOG_LEVEL` | `info` | Log level filter |
//! | `BUZZ_CONSOLE_OUTPUT` | `true` | Print logs to stdout |
//! | `BUZZ_JSON_LOGS` | `false` | JSON instead of pretty output |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging, LoggingGuard};
pub use metrics::{
    gather_text, register_metrics, MetricsHandle, BUS_CALL_TIMEOUTS, BUS_MESSAGES_DISPATCHED,
    BUS_MESSAGES_DROPPED, BUS_MESSAGES_RELAYED, BUS_MESSAGES_SENT, BUS_PENDING_CALLS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first, so counters are exported even if logging is refused
    let metrics_handle = register_metrics()?;
    let logging_guard = init_logging(&config)?;

    Ok(TelemetryGuard {
        _logging: logging_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logging: LoggingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
