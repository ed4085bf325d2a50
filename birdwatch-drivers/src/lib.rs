//! Hardware drivers for the Birdwatch sensor node
//!
//! Implementations of the `birdwatch-core` traits on top of the embedded-hal
//! async traits:
//!
//! - SSD1306 OLED over I2C, and the text surface drawn on it

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod display;
