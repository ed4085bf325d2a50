//! Board-agnostic logic for the Birdwatch sensor node
//!
//! The node joins a wireless network, subscribes to a feed of bird
//! detection events and shows the latest one on a small OLED. This crate
//! holds everything that does not depend on the actual radio or display:
//!
//! - Display frames and line layout
//! - Detection payload parsing
//! - Station link polling (network connector)
//! - Broker session on top of a byte stream (message subscriber)
//! - Node state machine and the controller that drives it
//! - Configuration types and the `node.toml` parser
//!
//! Hardware is reached only through the traits in [`traits`].

#![no_std]
#![deny(unsafe_code)]
#![allow(async_fn_in_trait)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod config;
pub mod controller;
pub mod detection;
pub mod frame;
pub mod network;
pub mod state;
pub mod subscriber;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{DetectionHandler, Halt, NodeController};
pub use frame::{DisplayFrame, LineLayout};
pub use network::{connect, ConnectFailure, LinkStatus};
pub use subscriber::{MessageHandler, SessionOptions, Subscriber, TransportError};
