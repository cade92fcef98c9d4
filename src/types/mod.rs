//! Value types shared by the coordinator and the vendor adapters.

mod brightness;
mod color;
mod hsv;
mod mode;

pub use brightness::Brightness;
pub use color::Color;
pub use hsv::Hsv;
pub use mode::Mode;
