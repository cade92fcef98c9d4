//! Hue, saturation and value color representation.

use serde::{Deserialize, Serialize};

use super::Color;

/// HSV color as understood by bulbs that take hue/saturation/brightness
/// instead of raw RGB.
///
/// - Hue: the color angle on the color wheel (0-359 degrees)
/// - Saturation: the intensity of the color (0-100 percent)
/// - Value: the lightness of the color (0-100 percent)
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hsv {
    hue: u16,
    saturation: u8,
    value: u8,
}

impl Hsv {
    /// Create a new Hsv with the given values.
    ///
    /// Returns `None` if values are outside valid ranges.
    ///
    /// ```
    /// use screen_sync::Hsv;
    ///
    /// assert!(Hsv::create(0, 100, 100).is_some());
    /// assert!(Hsv::create(360, 50, 50).is_none());
    /// assert!(Hsv::create(180, 101, 50).is_none());
    /// ```
    pub fn create(hue: u16, saturation: u8, value: u8) -> Option<Self> {
        if hue < 360 && saturation <= 100 && value <= 100 {
            Some(Hsv {
                hue,
                saturation,
                value,
            })
        } else {
            None
        }
    }

    pub fn hue(&self) -> u16 {
        self.hue
    }

    pub fn saturation(&self) -> u8 {
        self.saturation
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Convert an RGB color, truncating each scaled component toward zero.
    ///
    /// ```
    /// use screen_sync::{Color, Hsv};
    ///
    /// let hsv = Hsv::from_color(&Color::rgb(0, 0, 255));
    /// assert_eq!((hsv.hue(), hsv.saturation(), hsv.value()), (240, 100, 100));
    /// ```
    pub fn from_color(color: &Color) -> Self {
        let r = color.red as f64 / 255.0;
        let g = color.green as f64 / 255.0;
        let b = color.blue as f64 / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let value = max;
        if max == min {
            return Hsv {
                hue: 0,
                saturation: 0,
                value: (value * 100.0) as u8,
            };
        }

        let delta = max - min;
        let saturation = delta / max;
        let rc = (max - r) / delta;
        let gc = (max - g) / delta;
        let bc = (max - b) / delta;
        let h = if r == max {
            bc - gc
        } else if g == max {
            2.0 + rc - bc
        } else {
            4.0 + gc - rc
        };
        let h = (h / 6.0).rem_euclid(1.0);

        Hsv {
            // Guard against h rounding up to exactly 1.0.
            hue: ((h * 360.0) as u16).min(359),
            saturation: (saturation * 100.0) as u8,
            value: (value * 100.0) as u8,
        }
    }

    /// Convert back to RGB.
    ///
    /// ```
    /// use screen_sync::{Color, Hsv};
    ///
    /// let hsv = Hsv::create(0, 100, 100).unwrap();
    /// assert_eq!(hsv.to_color(), Color::rgb(255, 0, 0));
    /// ```
    pub fn to_color(&self) -> Color {
        let h = self.hue as f32;
        let s = self.saturation as f32 / 100.0;
        let v = self.value as f32 / 100.0;

        if s == 0.0 {
            let gray = (v * 255.0) as u8;
            return Color::rgb(gray, gray, gray);
        }

        let h = h / 60.0;
        let i = h.floor() as i32;
        let f = h - i as f32;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        let (r, g, b) = match i % 6 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };

        Color::rgb((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
    }
}

impl From<&Color> for Hsv {
    fn from(color: &Color) -> Self {
        Hsv::from_color(color)
    }
}
