//! TP-Link smart home protocol, as spoken by legacy Kasa bulbs on UDP port 9999.
//!
//! Requests and replies are JSON documents obfuscated with an XOR autokey
//! cipher (initial key 171). Over UDP there is no length prefix.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::errors::Error;
use crate::transport::{self, decode_json};
use crate::types::{Color, Hsv};

type Result<T> = std::result::Result<T, Error>;

pub(crate) const PORT: u16 = 9999;
const INITIAL_KEY: u8 = 171;

pub(crate) const LIGHTING_SERVICE: &str = "smartlife.iot.smartbulb.lightingservice";
pub(crate) const TRANSITION: &str = "transition_light_state";

pub(crate) fn encrypt(plain: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    plain
        .iter()
        .map(|b| {
            key ^= b;
            key
        })
        .collect()
}

pub(crate) fn decrypt(cipher: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    cipher
        .iter()
        .map(|&b| {
            let plain = key ^ b;
            key = b;
            plain
        })
        .collect()
}

/// Send `request` to the device at `addr` and return its decoded reply.
pub(crate) async fn query(addr: SocketAddr, request: &Value, limit: Duration) -> Result<Value> {
    let plain = serde_json::to_vec(request).map_err(Error::JsonDump)?;
    let reply = transport::request(addr, &encrypt(&plain), limit).await?;
    decode_json(decrypt(&reply))
}

pub(crate) fn sysinfo_request() -> Value {
    json!({"system": {"get_sysinfo": {}}})
}

/// Fields of a `transition_light_state` request. Unset fields are left
/// unchanged by the bulb.
#[serde_with::skip_serializing_none]
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub(crate) struct LightStateChange {
    pub on_off: Option<u8>,
    pub hue: Option<u16>,
    pub saturation: Option<u8>,
    pub brightness: Option<u8>,
    pub color_temp: Option<u16>,
}

impl LightStateChange {
    pub(crate) fn power(on: bool) -> Self {
        Self {
            on_off: Some(on as u8),
            ..Self::default()
        }
    }

    /// HSV change for `color`. Black switches the bulb off instead, since
    /// a zero brightness is not accepted while the bulb is on.
    pub(crate) fn color(color: &Color) -> Self {
        if color.is_black() {
            return Self::power(false);
        }
        Self::hsv(&Hsv::from_color(color))
    }

    pub(crate) fn hsv(hsv: &Hsv) -> Self {
        Self {
            on_off: Some(1),
            hue: Some(hsv.hue()),
            saturation: Some(hsv.saturation()),
            brightness: Some(hsv.value()),
            // A non-zero color temperature would override the hue.
            color_temp: Some(0),
        }
    }

    pub(crate) fn brightness(level: u8) -> Self {
        Self {
            on_off: Some(1),
            brightness: Some(level.min(100)),
            ..Self::default()
        }
    }

    pub(crate) fn to_request(&self) -> Result<Value> {
        let mut params = match serde_json::to_value(self).map_err(Error::JsonDump)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        params.insert("ignore_default".into(), json!(1));
        params.insert("transition_period".into(), json!(0));
        Ok(json!({ LIGHTING_SERVICE: { TRANSITION: params } }))
    }
}

/// Extract `reply[module][method]`, turning a non-zero `err_code` into an
/// error.
pub(crate) fn check_reply<'a>(
    addr: SocketAddr,
    reply: &'a Value,
    module: &str,
    method: &str,
) -> Result<&'a Value> {
    let body = reply
        .get(module)
        .and_then(|m| m.get(method))
        .ok_or_else(|| Error::device(addr, -1, &format!("reply has no {module}.{method}")))?;

    match body.get("err_code").and_then(Value::as_i64).unwrap_or(0) {
        0 => Ok(body),
        code => Err(Error::device(
            addr,
            code,
            body.get("err_msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error"),
        )),
    }
}

/// `system.get_sysinfo` payload. Bulbs report `mic_mac`, plugs `mac`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SysInfo {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "mic_mac")]
    pub mac: Option<String>,
    #[serde(default)]
    pub sw_ver: Option<String>,
    #[serde(default)]
    pub is_color: u8,
    #[serde(default)]
    pub is_dimmable: u8,
    #[serde(default)]
    pub rssi: Option<i32>,
    #[serde(default)]
    pub light_state: Option<LightState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LightState {
    #[serde(default)]
    pub on_off: u8,
    #[serde(default)]
    pub hue: Option<u16>,
    #[serde(default)]
    pub saturation: Option<u8>,
    #[serde(default)]
    pub brightness: Option<u8>,
}

impl SysInfo {
    pub(crate) fn parse(addr: SocketAddr, reply: &Value) -> Result<Self> {
        let body = check_reply(addr, reply, "system", "get_sysinfo")?;
        serde_json::from_value(body.clone()).map_err(Error::JsonLoad)
    }

    pub(crate) fn is_on(&self) -> Option<bool> {
        self.light_state.as_ref().map(|s| s.on_off == 1)
    }

    pub(crate) fn brightness(&self) -> Option<u8> {
        self.light_state
            .as_ref()
            .filter(|s| s.on_off == 1)
            .and_then(|s| s.brightness)
    }

    /// Current color, when the bulb is on and reports hue/saturation.
    pub(crate) fn color(&self) -> Option<Color> {
        let state = self.light_state.as_ref().filter(|s| s.on_off == 1)?;
        let hsv = Hsv::create(state.hue?, state.saturation?, state.brightness.unwrap_or(100))?;
        Some(hsv.to_color())
    }
}

/// A Kasa device that answered discovery.
#[derive(Debug, Clone)]
pub struct KasaDevice {
    pub addr: SocketAddr,
    pub alias: String,
    pub model: Option<String>,
    pub mac: Option<String>,
}

/// Broadcast `get_sysinfo` on `port` and collect the devices answering
/// within `window`.
pub(crate) async fn discover_on(port: u16, window: Duration) -> Result<Vec<(SocketAddr, SysInfo)>> {
    let request = serde_json::to_vec(&sysinfo_request()).map_err(Error::JsonDump)?;
    let target = SocketAddr::from((Ipv4Addr::BROADCAST, port));
    let replies = transport::broadcast(target, &encrypt(&request), window).await?;

    let mut found: Vec<(SocketAddr, SysInfo)> = Vec::new();
    for (addr, bytes) in replies {
        let parsed = decode_json(decrypt(&bytes)).and_then(|reply| SysInfo::parse(addr, &reply));
        match parsed {
            Ok(info) if !found.iter().any(|(known, _)| *known == addr) => found.push((addr, info)),
            Ok(_) => {}
            Err(e) => debug!("Ignoring discovery reply from {addr}: {e}"),
        }
    }
    Ok(found)
}

/// Discover Kasa devices on the local network.
///
/// ```ignore
/// use std::time::Duration;
/// use screen_sync::discover_kasa;
///
/// for device in discover_kasa(Duration::from_secs(3)).await? {
///     println!("{} at {}", device.alias, device.addr);
/// }
/// ```
pub async fn discover_kasa(window: Duration) -> Result<Vec<KasaDevice>> {
    Ok(discover_on(PORT, window)
        .await?
        .into_iter()
        .map(|(addr, info)| KasaDevice {
            addr,
            alias: info.alias,
            model: info.model,
            mac: info.mac,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 20], PORT))
    }

    #[test]
    fn test_cipher_known_bytes() {
        assert_eq!(encrypt(b"{}"), vec![0xd0, 0xad]);
        assert_eq!(decrypt(&[0xd0, 0xad]), b"{}".to_vec());
    }

    #[test]
    fn test_cipher_inverts() {
        let plain = serde_json::to_vec(&sysinfo_request()).unwrap();
        assert_ne!(encrypt(&plain), plain);
        assert_eq!(decrypt(&encrypt(&plain)), plain);
    }

    #[test]
    fn test_hsv_request() {
        let hsv = Hsv::from_color(&Color::rgb(255, 0, 0));
        let request = LightStateChange::hsv(&hsv).to_request().unwrap();
        let params = &request[LIGHTING_SERVICE][TRANSITION];
        assert_eq!(params["hue"], 0);
        assert_eq!(params["saturation"], 100);
        assert_eq!(params["brightness"], 100);
        assert_eq!(params["on_off"], 1);
        assert_eq!(params["color_temp"], 0);
        assert_eq!(params["transition_period"], 0);
    }

    #[test]
    fn test_black_switches_off() {
        assert_eq!(LightStateChange::color(&Color::rgb(0, 0, 0)), LightStateChange::power(false));
        let dim = LightStateChange::color(&Color::rgb(0, 0, 3));
        assert_eq!(dim.on_off, Some(1));
        assert_eq!(dim.hue, Some(240));
    }

    #[test]
    fn test_power_request_leaves_color_alone() {
        let request = LightStateChange::power(false).to_request().unwrap();
        let params = &request[LIGHTING_SERVICE][TRANSITION];
        assert_eq!(params["on_off"], 0);
        assert!(params.get("hue").is_none());
        assert!(params.get("brightness").is_none());
    }

    #[test]
    fn test_brightness_request_clamps() {
        let request = LightStateChange::brightness(150).to_request().unwrap();
        assert_eq!(request[LIGHTING_SERVICE][TRANSITION]["brightness"], 100);
    }

    #[test]
    fn test_check_reply_error_code() {
        let reply = json!({LIGHTING_SERVICE: {TRANSITION: {"err_code": -1, "err_msg": "module not support"}}});
        let err = check_reply(addr(), &reply, LIGHTING_SERVICE, TRANSITION).unwrap_err();
        assert_eq!(err, Error::device(addr(), -1, "module not support"));

        let ok = json!({LIGHTING_SERVICE: {TRANSITION: {"err_code": 0, "on_off": 1}}});
        assert!(check_reply(addr(), &ok, LIGHTING_SERVICE, TRANSITION).is_ok());

        assert!(check_reply(addr(), &json!({}), "system", "get_sysinfo").is_err());
    }

    #[test]
    fn test_parse_bulb_sysinfo() {
        let reply = json!({"system": {"get_sysinfo": {
            "alias": "Desk Lamp",
            "model": "KL130(US)",
            "mic_mac": "50C7BF000001",
            "sw_ver": "1.8.11",
            "is_color": 1,
            "is_dimmable": 1,
            "rssi": -52,
            "light_state": {"on_off": 1, "hue": 120, "saturation": 100, "brightness": 100, "color_temp": 0},
            "err_code": 0
        }}});
        let info = SysInfo::parse(addr(), &reply).unwrap();
        assert_eq!(info.alias, "Desk Lamp");
        assert_eq!(info.mac.as_deref(), Some("50C7BF000001"));
        assert_eq!(info.is_color, 1);
        assert_eq!(info.is_on(), Some(true));
        assert_eq!(info.color(), Some(Color::rgb(0, 255, 0)));
        assert_eq!(info.brightness(), Some(100));
    }

    #[test]
    fn test_parse_switched_off_bulb() {
        let reply = json!({"system": {"get_sysinfo": {
            "alias": "Shelf",
            "light_state": {"on_off": 0, "dft_on_state": {"hue": 0, "saturation": 0, "brightness": 50}}
        }}});
        let info = SysInfo::parse(addr(), &reply).unwrap();
        assert_eq!(info.is_on(), Some(false));
        assert_eq!(info.color(), None);
        assert_eq!(info.is_color, 0);
    }
}
