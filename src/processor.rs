//! Screen sampling collaborator.

use async_trait::async_trait;

use crate::errors::Error;
use crate::types::{Color, Mode};

/// Zone every bulb mirrors in [`Mode::Shooter`].
pub const CENTER_ZONE: &str = "center";

/// Supplies the average color of a named screen zone.
///
/// Screen capture and color extraction live outside this crate. Capture is
/// usually blocking work, so implementations should move it off the async
/// executor (a dedicated thread, `spawn_blocking`, ...) and resolve the
/// future once the color is known. The coordinator bounds every call with
/// its `sample_timeout`.
///
/// # Example
///
/// ```
/// use screen_sync::{Color, ColorProcessor, Error, Mode, async_trait};
///
/// struct Solid(Color);
///
/// #[async_trait]
/// impl ColorProcessor for Solid {
///     async fn process_screen_zone(&self, _zone: &str, _mode: Mode) -> Result<Color, Error> {
///         Ok(self.0)
///     }
/// }
/// ```
#[async_trait]
pub trait ColorProcessor: Send + Sync {
    /// Sample `zone`. `mode` is [`Mode::Shooter`] when the caller wants the
    /// shooter sampling semantics for the center zone.
    async fn process_screen_zone(&self, zone: &str, mode: Mode) -> Result<Color, Error>;
}
