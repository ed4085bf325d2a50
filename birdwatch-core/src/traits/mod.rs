//! Hardware abstraction traits
//!
//! These traits are the seams between the node logic and the board. The
//! firmware implements them for the Pico W; tests implement them with
//! scripted fakes.

pub mod broker;
pub mod display;
pub mod network;

pub use broker::BrokerLink;
pub use display::DisplaySurface;
pub use network::WifiLink;
