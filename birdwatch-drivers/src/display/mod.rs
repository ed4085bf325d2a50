//! OLED display drivers

pub mod ssd1306;
pub mod surface;

pub use ssd1306::{GeometryError, Ssd1306};
pub use surface::OledSurface;
