//! MQTT 3.1.1 wire format (subscriber subset)
//!
//! This crate encodes and decodes the handful of control packets a
//! subscribe-only sensor node needs. Nothing here touches I/O; the session
//! layer in `birdwatch-core` reads bytes off the socket and hands them in.
//!
//! # Packet Layout
//!
//! ```text
//! ┌────────────┬──────────────────┬─────────────────┬─────────┐
//! │ TYPE/FLAGS │ REMAINING LENGTH │ VARIABLE HEADER │ PAYLOAD │
//! │ 1B         │ 1-4B             │ per type        │         │
//! └────────────┴──────────────────┴─────────────────┴─────────┘
//! ```
//!
//! Only QoS 0 and QoS 1 deliveries are acknowledged; the node never
//! publishes.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod frame;
pub mod packets;

pub use frame::{FixedHeader, HeaderParser, PacketError, PacketType, MAX_HEADER_SIZE};
pub use packets::{
    ConnAck, Connect, ConnectReturnCode, Packet, PubAck, Publish, QoS, SubAck, Subscribe,
    DISCONNECT, PINGREQ,
};

/// Largest packet the node buffers in full
///
/// Longer PUBLISH packets are read off the wire and discarded.
pub const MAX_PACKET_SIZE: usize = 512;
