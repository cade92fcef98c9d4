//! Wiz color bulbs.

mod protocol;

pub use protocol::{WizDevice, discover_wiz};

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::bulb::{BulbControl, CommandGate, DeviceInfo, connect_with_retry};
use crate::config::RetryPolicy;
use crate::errors::Error;
use crate::processor::CENTER_ZONE;
use crate::rate_limiter::RateLimiter;
use crate::types::Color;

use protocol::{Pilot, SystemConfig};

type Result<T> = std::result::Result<T, Error>;

/// How to find and drive one Wiz bulb. Either `mac` (matched during
/// discovery) or `host` must be set.
#[serde_as]
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WizBulbConfig {
    pub name: Option<String>,
    pub mac: Option<String>,
    pub host: Option<IpAddr>,
    pub port: u16,
    pub placement: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "min_interval_ms")]
    pub min_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "discovery_timeout_ms")]
    pub discovery_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for WizBulbConfig {
    fn default() -> Self {
        Self {
            name: None,
            mac: None,
            host: None,
            port: protocol::PORT,
            placement: CENTER_ZONE.to_string(),
            min_interval: RateLimiter::DEFAULT_MIN_INTERVAL,
            discovery_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

impl WizBulbConfig {
    pub fn with_mac(mac: &str, placement: &str) -> Self {
        Self {
            mac: Some(mac.to_string()),
            placement: placement.to_string(),
            ..Self::default()
        }
    }

    pub fn with_host(host: IpAddr, placement: &str) -> Self {
        Self {
            host: Some(host),
            placement: placement.to_string(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

struct Connection {
    addr: SocketAddr,
    system: SystemConfig,
}

/// A Wiz bulb driven over its local UDP API.
///
/// ```
/// use std::net::{IpAddr, Ipv4Addr};
/// use screen_sync::{BulbControl, WizBulb, WizBulbConfig};
///
/// let bulb = WizBulb::new(
///     WizBulbConfig::with_host(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 30)), "left").named("Floor"),
/// );
/// assert_eq!(bulb.label(), "Floor");
/// assert!(!bulb.is_connected());
/// ```
pub struct WizBulb {
    config: WizBulbConfig,
    label: String,
    gate: CommandGate,
    device: Option<Connection>,
}

impl WizBulb {
    pub fn new(config: WizBulbConfig) -> Self {
        let label = match (&config.name, &config.mac, &config.host) {
            (Some(name), _, _) => name.clone(),
            (None, Some(mac), _) => mac.clone(),
            (None, None, Some(host)) => host.to_string(),
            (None, None, None) => "unnamed Wiz bulb".to_string(),
        };
        let gate = CommandGate::new(RateLimiter::new(config.min_interval));
        Self {
            config,
            label,
            gate,
            device: None,
        }
    }

    pub fn config(&self) -> &WizBulbConfig {
        &self.config
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.device.as_ref().map(|d| d.addr)
    }

    async fn locate(&self) -> Result<(SocketAddr, SystemConfig)> {
        let addr = match (self.config.host, &self.config.mac) {
            (Some(ip), _) => SocketAddr::new(ip, self.config.port),
            (None, Some(mac)) => {
                let wanted = protocol::normalize_mac(mac);
                protocol::discover_on(self.config.port, self.config.discovery_timeout)
                    .await?
                    .into_iter()
                    .find(|d| protocol::normalize_mac(&d.mac) == wanted)
                    .map(|d| d.addr)
                    .ok_or_else(|| Error::DeviceNotFound(format!("MAC {mac}")))?
            }
            (None, None) => return Err(Error::MissingIdentity(self.label.clone())),
        };

        let result = protocol::call(
            addr,
            &json!({"method": "getSystemConfig"}),
            self.config.request_timeout,
        )
        .await?;
        let system = serde_json::from_value(result).map_err(Error::JsonLoad)?;
        Ok((addr, system))
    }

    async fn send(&self, request: &Value) -> Result<()> {
        let addr = self
            .addr()
            .ok_or_else(|| Error::MissingIdentity(self.label.clone()))?;
        protocol::call(addr, request, self.config.request_timeout).await?;
        Ok(())
    }

    async fn power(&mut self, on: bool) {
        if self.device.is_none() {
            return;
        }
        match self.send(&protocol::state_request(on)).await {
            Ok(()) if !on => self.gate.forget_color(),
            Ok(()) => {}
            Err(e) => warn!("Failed to switch {} {}: {e}", self.label, if on { "on" } else { "off" }),
        }
    }
}

#[async_trait]
impl BulbControl for WizBulb {
    fn label(&self) -> &str {
        &self.label
    }

    fn placement(&self) -> &str {
        &self.config.placement
    }

    fn vendor(&self) -> &'static str {
        "Wiz"
    }

    fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        let (addr, system) =
            connect_with_retry(&self.label, &self.config.retry, || self.locate()).await?;

        if !system.supports_color() {
            warn!(
                "{} ({}) does not support color; color updates will be skipped",
                self.label,
                system.module_name.as_deref().unwrap_or("unknown module")
            );
        }
        info!("Connected to Wiz bulb {} at {addr}", self.label);
        self.device = Some(Connection { addr, system });
        Ok(())
    }

    async fn set_color(&mut self, color: Color) {
        let Some(device) = &self.device else {
            return;
        };
        if !device.system.supports_color() || !self.gate.admit_color(&color) {
            return;
        }

        match self.send(&protocol::color_request(&color)).await {
            Ok(()) => {
                debug!("{} <- {color}", self.label);
                self.gate.record_color(color);
            }
            Err(e) => warn!("Failed to set color on {}: {e}", self.label),
        }
    }

    async fn set_brightness(&mut self, level: u8) {
        if self.device.is_none() || !self.gate.admit() {
            return;
        }
        if let Err(e) = self.send(&protocol::dimming_request(level)).await {
            warn!("Failed to set brightness on {}: {e}", self.label);
        }
    }

    async fn turn_on(&mut self) {
        self.power(true).await
    }

    async fn turn_off(&mut self) {
        self.power(false).await
    }

    async fn status(&mut self) -> Option<DeviceInfo> {
        let device = self.device.as_ref()?;
        let pilot = protocol::call(
            device.addr,
            &json!({"method": "getPilot"}),
            self.config.request_timeout,
        )
        .await
        .and_then(|result| serde_json::from_value::<Pilot>(result).map_err(Error::JsonLoad));

        match pilot {
            Ok(pilot) => Some(DeviceInfo {
                name: self.label.clone(),
                model: device.system.module_name.clone(),
                mac: pilot.mac.clone().or_else(|| Some(device.system.mac.clone())),
                firmware: device.system.fw_version.clone(),
                power: pilot.state,
                color: pilot.color(),
                brightness: pilot.dimming,
                rssi: pilot.rssi,
            }),
            Err(e) => {
                warn!("Failed to query {}: {e}", self.label);
                None
            }
        }
    }

    fn last_color(&self) -> Option<Color> {
        self.gate.last_color()
    }

    fn cooldown(&self) -> Duration {
        self.gate.cooldown()
    }
}
