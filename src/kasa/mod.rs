//! TP-Link Kasa color bulbs.

mod protocol;

pub use protocol::{KasaDevice, discover_kasa};

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::bulb::{BulbControl, CommandGate, DeviceInfo, connect_with_retry};
use crate::config::RetryPolicy;
use crate::errors::Error;
use crate::processor::CENTER_ZONE;
use crate::rate_limiter::RateLimiter;
use crate::types::Color;

use protocol::{LIGHTING_SERVICE, LightStateChange, SysInfo, TRANSITION};

type Result<T> = std::result::Result<T, Error>;

/// How to find and drive one Kasa bulb.
///
/// ```
/// use screen_sync::KasaBulbConfig;
///
/// let config: KasaBulbConfig =
///     serde_json::from_str(r#"{"alias": "Desk Lamp", "placement": "center-left", "host": "192.168.1.20"}"#)
///         .unwrap();
/// assert_eq!(config.port, 9999);
/// assert_eq!(config.min_interval.as_millis(), 100);
/// ```
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KasaBulbConfig {
    /// Device alias as set in the Kasa app; matched during discovery.
    pub alias: String,
    pub placement: String,
    /// Skip discovery and talk to this address directly.
    pub host: Option<IpAddr>,
    pub port: u16,
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

impl Default for KasaBulbConfig {
    fn default() -> Self {
        Self {
            alias: String::new(),
            placement: CENTER_ZONE.to_string(),
            host: None,
            port: protocol::PORT,
            min_interval: RateLimiter::DEFAULT_MIN_INTERVAL,
            discovery_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

impl KasaBulbConfig {
    pub fn new(alias: &str, placement: &str) -> Self {
        Self {
            alias: alias.to_string(),
            placement: placement.to_string(),
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = Some(host);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Connection {
    addr: SocketAddr,
    color: bool,
    dimmable: bool,
}

/// A Kasa bulb driven over the local smart home protocol.
pub struct KasaBulb {
    config: KasaBulbConfig,
    gate: CommandGate,
    device: Option<Connection>,
}

impl KasaBulb {
    pub fn new(config: KasaBulbConfig) -> Self {
        let gate = CommandGate::new(RateLimiter::new(config.min_interval));
        Self {
            config,
            gate,
            device: None,
        }
    }

    pub fn config(&self) -> &KasaBulbConfig {
        &self.config
    }

    /// Address of the device once connected.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.device.map(|d| d.addr)
    }

    async fn locate(&self) -> Result<(SocketAddr, SysInfo)> {
        if let Some(ip) = self.config.host {
            let addr = SocketAddr::new(ip, self.config.port);
            let reply = protocol::query(addr, &protocol::sysinfo_request(), self.config.request_timeout).await?;
            return Ok((addr, SysInfo::parse(addr, &reply)?));
        }

        if self.config.alias.is_empty() {
            return Err(Error::MissingIdentity(self.config.placement.clone()));
        }

        protocol::discover_on(self.config.port, self.config.discovery_timeout)
            .await?
            .into_iter()
            .find(|(_, info)| info.alias == self.config.alias)
            .ok_or_else(|| Error::DeviceNotFound(format!("alias '{}'", self.config.alias)))
    }

    async fn transition(&self, addr: SocketAddr, change: &LightStateChange) -> Result<()> {
        let reply = protocol::query(addr, &change.to_request()?, self.config.request_timeout).await?;
        protocol::check_reply(addr, &reply, LIGHTING_SERVICE, TRANSITION)?;
        Ok(())
    }

    async fn power(&mut self, on: bool) {
        let Some(device) = self.device else {
            return;
        };
        match self.transition(device.addr, &LightStateChange::power(on)).await {
            Ok(()) if !on => self.gate.forget_color(),
            Ok(()) => {}
            Err(e) => warn!("Failed to switch {} {}: {e}", self.label(), if on { "on" } else { "off" }),
        }
    }
}

#[async_trait]
impl BulbControl for KasaBulb {
    fn label(&self) -> &str {
        &self.config.alias
    }

    fn placement(&self) -> &str {
        &self.config.placement
    }

    fn vendor(&self) -> &'static str {
        "Kasa"
    }

    fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        let label = self.label().to_string();
        let (addr, info) = connect_with_retry(&label, &self.config.retry, || self.locate()).await?;

        if info.is_color == 0 {
            warn!("{label} does not support color; color updates will be skipped");
        }
        self.device = Some(Connection {
            addr,
            color: info.is_color != 0,
            dimmable: info.is_dimmable != 0,
        });
        info!("Connected to Kasa bulb {label} at {addr}");
        Ok(())
    }

    async fn set_color(&mut self, color: Color) {
        let Some(device) = self.device else {
            return;
        };
        if !device.color || !self.gate.admit_color(&color) {
            return;
        }

        let change = LightStateChange::color(&color);
        match self.transition(device.addr, &change).await {
            Ok(()) => {
                debug!("{} <- {color} ({change:?})", self.label());
                self.gate.record_color(color);
            }
            Err(e) => warn!("Failed to set color on {}: {e}", self.label()),
        }
    }

    async fn set_brightness(&mut self, level: u8) {
        let Some(device) = self.device else {
            return;
        };
        if !device.dimmable || !self.gate.admit() {
            return;
        }
        if let Err(e) = self
            .transition(device.addr, &LightStateChange::brightness(level))
            .await
        {
            warn!("Failed to set brightness on {}: {e}", self.label());
        }
    }

    async fn turn_on(&mut self) {
        self.power(true).await
    }

    async fn turn_off(&mut self) {
        self.power(false).await
    }

    async fn status(&mut self) -> Option<DeviceInfo> {
        let addr = self.device?.addr;
        let info = protocol::query(addr, &protocol::sysinfo_request(), self.config.request_timeout)
            .await
            .and_then(|reply| SysInfo::parse(addr, &reply));

        match info {
            Ok(info) => Some(DeviceInfo {
                power: info.is_on(),
                color: info.color(),
                brightness: info.brightness(),
                name: info.alias,
                model: info.model,
                mac: info.mac,
                firmware: info.sw_ver,
                rssi: info.rssi,
            }),
            Err(e) => {
                warn!("Failed to query {}: {e}", self.label());
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
