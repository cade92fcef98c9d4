//! Sampling modes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::errors::Error;

/// How the update loop picks the zone each bulb mirrors.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
    EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    /// Every bulb mirrors its own placement zone.
    #[default]
    Normal,
    /// Every bulb mirrors the center of the screen.
    Shooter,
}

impl Mode {
    /// Parse a mode name, case-insensitively.
    ///
    /// ```
    /// use screen_sync::Mode;
    ///
    /// assert_eq!(Mode::parse("Shooter").unwrap(), Mode::Shooter);
    /// assert!(Mode::parse("racing").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self, Error> {
        Mode::from_str(name).map_err(|_| Error::InvalidMode(name.to_string()))
    }
}
