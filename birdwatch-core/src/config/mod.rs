//! Node configuration
//!
//! Configuration is fixed at build time: `node.toml` is embedded in the
//! firmware image and parsed once at boot.

pub mod parse;
pub mod types;

pub use parse::{parse_config, ParseError};
pub use types::*;
