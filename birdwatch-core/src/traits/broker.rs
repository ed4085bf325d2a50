//! Byte stream to the message broker

use embedded_io_async::{Read, Write};

use crate::subscriber::TransportError;

/// A reliable byte stream that can be opened to a broker
///
/// Reads and writes go through [`embedded_io_async`]; a read returning zero
/// bytes means the peer closed the connection.
pub trait BrokerLink: Read + Write {
    /// Resolve `host` and open a connection to it
    async fn open(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Non-blocking check for inbound data
    ///
    /// `Ok(true)` when at least one byte can be read without waiting,
    /// `Ok(false)` when the connection is idle, and an error once the peer
    /// has gone away.
    fn readable(&mut self) -> Result<bool, TransportError>;

    /// Drop the connection
    fn close(&mut self);
}
