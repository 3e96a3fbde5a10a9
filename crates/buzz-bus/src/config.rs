//! Bus configuration from environment variables.

use std::env;
use std::time::Duration;

/// Settings shared by every component attached to a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Per-listener buffer of the in-memory transport.
    pub channel_capacity: usize,

    /// Default timeout for calls. `None` keeps unanswered calls registered
    /// until cancelled.
    pub call_timeout: Option<Duration>,

    /// How often connectors evict expired calls.
    pub sweep_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: crate::DEFAULT_CHANNEL_CAPACITY,
            call_timeout: None,
            sweep_interval: Duration::from_millis(crate::DEFAULT_SWEEP_INTERVAL_MS),
        }
    }
}

impl BusConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BUZZ_CHANNEL_CAPACITY`: Transport buffer per listener (default: 1000)
    /// - `BUZZ_CALL_TIMEOUT_MS`: Default call timeout, `0` or unset for none
    /// - `BUZZ_SWEEP_INTERVAL_MS`: Expired call eviction interval (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            channel_capacity: env::var("BUZZ_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.channel_capacity),

            call_timeout: env::var("BUZZ_CALL_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),

            sweep_interval: env::var("BUZZ_SWEEP_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}
