//! Wiz JSON-over-UDP messages.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::Error;
use crate::transport::{self, decode_json};
use crate::types::Color;

type Result<T> = std::result::Result<T, Error>;

pub(crate) const PORT: u16 = 38899;

/// Lowest dimming level a Wiz bulb accepts.
pub(crate) const MIN_DIMMING: u8 = 10;

pub(crate) fn registration_request() -> Value {
    json!({
        "method": "registration",
        "params": {
            "phoneMac": "AAAAAAAAAAAA",
            "register": false,
            "phoneIp": "1.2.3.4",
            "id": "1"
        }
    })
}

pub(crate) fn color_request(color: &Color) -> Value {
    if color.is_black() {
        // setPilot rejects an all-zero color
        return state_request(false);
    }
    json!({
        "method": "setPilot",
        "params": {"state": true, "r": color.red(), "g": color.green(), "b": color.blue()}
    })
}

pub(crate) fn dimming_request(level: u8) -> Value {
    json!({
        "method": "setPilot",
        "params": {"dimming": level.clamp(MIN_DIMMING, 100)}
    })
}

pub(crate) fn state_request(on: bool) -> Value {
    json!({"method": "setState", "params": {"state": on}})
}

/// Send `request` to `addr`, returning the reply's `result` object.
pub(crate) async fn call(addr: SocketAddr, request: &Value, limit: Duration) -> Result<Value> {
    let bytes = serde_json::to_vec(request).map_err(Error::JsonDump)?;
    let reply = decode_json(transport::request(addr, &bytes, limit).await?)?;
    check_reply(addr, reply)
}

pub(crate) fn check_reply(addr: SocketAddr, mut reply: Value) -> Result<Value> {
    if let Some(error) = reply.get("error") {
        return Err(Error::device(
            addr,
            error.get("code").and_then(Value::as_i64).unwrap_or(-1),
            error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error"),
        ));
    }
    Ok(reply
        .get_mut("result")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

/// `getSystemConfig` result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SystemConfig {
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub fw_version: Option<String>,
}

impl SystemConfig {
    /// Whether the module can show colors. Module names look like
    /// `ESP01_SHRGB1C_31`; unknown names are assumed to be color capable.
    pub(crate) fn supports_color(&self) -> bool {
        match self.module_name.as_deref().and_then(|m| m.split('_').nth(1)) {
            Some(kind) => kind.contains("RGB"),
            None => true,
        }
    }
}

/// `getPilot` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Pilot {
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub state: Option<bool>,
    #[serde(default)]
    pub r: Option<u8>,
    #[serde(default)]
    pub g: Option<u8>,
    #[serde(default)]
    pub b: Option<u8>,
    #[serde(default)]
    pub dimming: Option<u8>,
    #[serde(default)]
    pub rssi: Option<i32>,
}

impl Pilot {
    pub(crate) fn color(&self) -> Option<Color> {
        match (self.r, self.g, self.b) {
            (Some(r), Some(g), Some(b)) => Some(Color::rgb(r, g, b)),
            _ => None,
        }
    }
}

/// Lower-case hex digits only, so `A8:BB:50:00:00:01` matches `a8bb50000001`.
pub(crate) fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A discovered Wiz bulb on the network.
#[derive(Debug, Clone)]
pub struct WizDevice {
    pub addr: SocketAddr,
    pub mac: String,
}

/// Broadcast `registration` on `port` and collect one entry per MAC.
pub(crate) async fn discover_on(port: u16, window: Duration) -> Result<Vec<WizDevice>> {
    let bytes = serde_json::to_vec(&registration_request()).map_err(Error::JsonDump)?;
    let target = SocketAddr::from((Ipv4Addr::BROADCAST, port));

    let mut discovered: HashMap<String, WizDevice> = HashMap::new();
    for (addr, reply) in transport::broadcast(target, &bytes, window).await? {
        let mac = decode_json(reply)
            .ok()
            .and_then(|json| json.get("result")?.get("mac")?.as_str().map(String::from));
        match mac {
            Some(mac) => {
                discovered.insert(mac.clone(), WizDevice { addr, mac });
            }
            None => debug!("Ignoring discovery reply from {addr}"),
        }
    }
    Ok(discovered.into_values().collect())
}

/// Discover Wiz bulbs on the local network.
///
/// ```ignore
/// use std::time::Duration;
/// use screen_sync::discover_wiz;
///
/// for bulb in discover_wiz(Duration::from_secs(5)).await? {
///     println!("  {} - {}", bulb.addr, bulb.mac);
/// }
/// ```
pub async fn discover_wiz(window: Duration) -> Result<Vec<WizDevice>> {
    discover_on(PORT, window).await
}
