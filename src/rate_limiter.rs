//! Per-bulb command rate limiting.

use std::time::{Duration, Instant};

/// Gate bounding how often a single bulb receives commands.
///
/// The limiter never queues or delays anything: a denied call is simply
/// dropped by the caller, and the next tick's color serves as the retry.
/// Each bulb owns its own limiter.
///
/// ```
/// use std::time::Duration;
/// use screen_sync::RateLimiter;
///
/// let mut limiter = RateLimiter::new(Duration::from_secs(60));
/// assert!(limiter.is_allowed());
/// assert!(!limiter.is_allowed());
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_allowed: Option<Instant>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_INTERVAL)
    }
}

impl RateLimiter {
    /// Ten commands per second.
    pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_allowed: None,
        }
    }

    /// Build a limiter from a maximum number of commands per second.
    ///
    /// A non-positive or non-finite rate disables limiting.
    pub fn per_second(rate: f64) -> Self {
        if rate.is_finite() && rate > 0.0 {
            Self::new(Duration::from_secs_f64(1.0 / rate))
        } else {
            Self::new(Duration::ZERO)
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Returns true and records the call if at least the minimum interval
    /// elapsed since the last allowed call. Denied calls change nothing.
    pub fn is_allowed(&mut self) -> bool {
        let now = Instant::now();
        match self.last_allowed {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_allowed = Some(now);
                true
            }
        }
    }

    /// Time left until the next call would be allowed.
    pub fn remaining(&self) -> Duration {
        self.last_allowed
            .map(|last| self.min_interval.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO)
    }
}
