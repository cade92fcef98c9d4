//! Tuning knobs for the coordinator and the vendor adapters.
//!
//! Nothing here reads files; the structs deserialize from whatever format the
//! host application uses, with every field optional.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMicroSeconds, DurationMilliSeconds, serde_as};

use crate::types::Color;

/// Timing and shutdown behaviour of the [`crate::Coordinator`].
///
/// ```
/// use screen_sync::{Color, CoordinatorConfig};
///
/// let config: CoordinatorConfig =
///     serde_json::from_str(r#"{"error_backoff_ms": 250, "shutdown_color": {"red": 0, "green": 0, "blue": 0}}"#)
///         .unwrap();
/// assert_eq!(config.error_backoff.as_millis(), 250);
/// assert_eq!(config.shutdown_color, Color::rgb(0, 0, 0));
/// assert_eq!(config.loop_stop_timeout.as_secs(), 2);
/// ```
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Pause between ticks; effectively a scheduling yield.
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    #[serde(rename = "tick_interval_us")]
    pub tick_interval: Duration,

    /// Pause after a failed tick.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "error_backoff_ms")]
    pub error_backoff: Duration,

    /// Upper bound on a single `process_screen_zone` call.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "sample_timeout_ms")]
    pub sample_timeout: Duration,

    /// How long `stop` waits for the update loop to exit.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "loop_stop_timeout_ms")]
    pub loop_stop_timeout: Duration,

    /// How long `stop` waits for each bulb worker to finish its command.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "dispatch_stop_timeout_ms")]
    pub dispatch_stop_timeout: Duration,

    /// Color every bulb is driven to when the coordinator stops.
    pub shutdown_color: Color,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_micros(100),
            error_backoff: Duration::from_millis(100),
            sample_timeout: Duration::from_secs(1),
            loop_stop_timeout: Duration::from_secs(2),
            dispatch_stop_timeout: Duration::from_secs(1),
            shutdown_color: Color::WARM_YELLOW.scale(50),
        }
    }
}

/// Bounded retry with progressive backoff, used when connecting to bulbs.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay after each failed attempt; the last entry repeats.
    #[serde_as(as = "Vec<DurationMilliSeconds<u64>>")]
    #[serde(rename = "delays_ms")]
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delays: [750, 1500, 3000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// A single attempt with no delay.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            delays: Vec::new(),
        }
    }

    /// Delay to wait after the given zero-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.delays.len().saturating_sub(1));
        self.delays.get(idx).copied().unwrap_or(Duration::ZERO)
    }
}
