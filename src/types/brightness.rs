//! Global brightness scaling.

use serde::{Deserialize, Serialize};

use super::Color;

/// Brightness percentage applied to every sampled color, always 1 to 100.
///
/// Every way of building a `Brightness` clamps, so out-of-range values can
/// never reach the update loop.
///
/// ```
/// use screen_sync::Brightness;
///
/// assert_eq!(Brightness::clamp(0).value(), 1);
/// assert_eq!(Brightness::clamp(150).value(), 100);
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(from = "i32", into = "u8")]
pub struct Brightness {
    value: u8,
}

impl Default for Brightness {
    fn default() -> Self {
        Self::new()
    }
}

impl Brightness {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;

    /// Full brightness.
    pub fn new() -> Self {
        Brightness { value: Self::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn clamp(value: i32) -> Self {
        Brightness {
            value: value.clamp(Self::MIN as i32, Self::MAX as i32) as u8,
        }
    }

    /// Scale a sampled color by this brightness.
    pub fn apply(&self, color: &Color) -> Color {
        color.scale(self.value)
    }
}

impl From<i32> for Brightness {
    fn from(value: i32) -> Self {
        Self::clamp(value)
    }
}

impl From<Brightness> for u8 {
    fn from(brightness: Brightness) -> Self {
        brightness.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_bounds() {
        for raw in [-50, 0, 1, 42, 100, 101, 150, i32::MAX] {
            let value = Brightness::clamp(raw).value();
            assert!((1..=100).contains(&value), "{raw} clamped to {value}");
        }
        assert_eq!(Brightness::clamp(0).value(), 1);
        assert_eq!(Brightness::clamp(150).value(), 100);
        assert_eq!(Brightness::clamp(42).value(), 42);
    }

    #[test]
    fn test_apply_half() {
        let half = Brightness::clamp(50);
        assert_eq!(half.apply(&Color::rgb(255, 220, 150)), Color::rgb(127, 110, 75));
    }

    #[test]
    fn test_apply_full_is_identity() {
        let color = Color::rgb(12, 34, 56);
        assert_eq!(Brightness::new().apply(&color), color);
    }

    #[test]
    fn test_deserialize_clamps() {
        let b: Brightness = serde_json::from_str("250").unwrap();
        assert_eq!(b.value(), 100);
        assert_eq!(serde_json::to_string(&Brightness::clamp(30)).unwrap(), "30");
    }
}
