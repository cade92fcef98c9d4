//! The bulb capability interface shared by every vendor adapter.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::RetryPolicy;
use crate::errors::Error;
use crate::rate_limiter::RateLimiter;
use crate::runtime;
use crate::types::Color;

type Result<T> = std::result::Result<T, Error>;

/// Operations the coordinator needs from a smart bulb.
///
/// Every operation is fail-soft: command failures are logged and swallowed
/// inside the implementation, and an unconnected bulb turns every command
/// into a no-op. Only [`BulbControl::connect`] reports an error, so callers
/// can tell whether the bulb is usable.
///
/// Implementations own their [`CommandGate`] (rate limiter plus dedup cache)
/// and their connection handle.
#[async_trait]
pub trait BulbControl: Send {
    /// Human readable identity (alias, MAC or address).
    fn label(&self) -> &str;

    /// Screen zone this bulb mirrors in normal mode.
    fn placement(&self) -> &str;

    /// Short vendor name, used in logs.
    fn vendor(&self) -> &'static str;

    fn is_connected(&self) -> bool;

    /// Discover the device and perform the handshake.
    async fn connect(&mut self) -> Result<()>;

    /// Send a color unless it repeats the last one or the rate limiter
    /// denies it.
    async fn set_color(&mut self, color: Color);

    /// Set brightness in percent (0-100).
    async fn set_brightness(&mut self, level: u8);

    async fn turn_on(&mut self);

    async fn turn_off(&mut self);

    /// Query the device. `None` when unconnected or on any failure.
    async fn status(&mut self) -> Option<DeviceInfo>;

    /// Last color successfully sent.
    fn last_color(&self) -> Option<Color> {
        None
    }

    /// Time until the rate limiter would allow the next command.
    fn cooldown(&self) -> Duration {
        Duration::ZERO
    }
}

/// Vendor-neutral device status.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub model: Option<String>,
    pub mac: Option<String>,
    pub firmware: Option<String>,
    pub power: Option<bool>,
    pub color: Option<Color>,
    /// Percent.
    pub brightness: Option<u8>,
    pub rssi: Option<i32>,
}

/// Per-bulb dedup cache and rate limiter.
///
/// ```
/// use std::time::Duration;
/// use screen_sync::{Color, CommandGate, RateLimiter};
///
/// let mut gate = CommandGate::new(RateLimiter::new(Duration::ZERO));
/// let red = Color::rgb(255, 0, 0);
/// assert!(gate.admit_color(&red));
/// gate.record_color(red);
/// assert!(!gate.admit_color(&red));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandGate {
    limiter: RateLimiter,
    last_color: Option<Color>,
}

impl CommandGate {
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            limiter,
            last_color: None,
        }
    }

    /// Whether `color` differs from the cached one. Does not touch the
    /// rate limiter.
    pub fn is_new_color(&self, color: &Color) -> bool {
        self.last_color.as_ref() != Some(color)
    }

    /// Dedup check followed by the rate limiter.
    pub fn admit_color(&mut self, color: &Color) -> bool {
        self.is_new_color(color) && self.limiter.is_allowed()
    }

    /// Rate limiter only, for commands without a dedup cache.
    pub fn admit(&mut self) -> bool {
        self.limiter.is_allowed()
    }

    /// Cache a color after a command carrying it was sent.
    pub fn record_color(&mut self, color: Color) {
        self.last_color = Some(color);
    }

    /// Forget the cached color, e.g. after the bulb was switched off.
    pub fn forget_color(&mut self) {
        self.last_color = None;
    }

    pub fn last_color(&self) -> Option<Color> {
        self.last_color
    }

    pub fn cooldown(&self) -> Duration {
        self.limiter.remaining()
    }
}

/// Run `attempt` until it succeeds or the policy is exhausted, sleeping the
/// policy's delay between attempts. The final failure is logged as a
/// warning and returned.
pub(crate) async fn connect_with_retry<F, Fut, T>(
    label: &str,
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut n = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if n + 1 < attempts => {
                let delay = policy.delay(n);
                debug!(
                    "Connecting to {label} failed (attempt {}/{attempts}): {e}; retrying in {delay:?}",
                    n + 1
                );
                runtime::sleep(delay).await;
                n += 1;
            }
            Err(e) => {
                warn!("Giving up on {label} after {attempts} attempt(s): {e}");
                return Err(e);
            }
        }
    }
}
