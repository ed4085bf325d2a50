//! TCP link to the broker

use birdwatch_core::traits::BrokerLink;
use birdwatch_core::TransportError;
use defmt::*;
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use embassy_time::Duration;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use static_cell::StaticCell;

const RX_BUFFER_SIZE: usize = 1024;
const TX_BUFFER_SIZE: usize = 1024;

/// Abort when sent data goes unacknowledged this long
const SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

static RX_BUFFER: StaticCell<[u8; RX_BUFFER_SIZE]> = StaticCell::new();
static TX_BUFFER: StaticCell<[u8; TX_BUFFER_SIZE]> = StaticCell::new();

/// [`BrokerLink`] over an embassy-net TCP socket
pub struct TcpBroker {
    stack: Stack<'static>,
    socket: TcpSocket<'static>,
}

impl TcpBroker {
    /// Create the broker socket
    ///
    /// The socket buffers are static; this can only be called once.
    pub fn new(stack: Stack<'static>) -> Self {
        let rx = RX_BUFFER.init([0; RX_BUFFER_SIZE]);
        let tx = TX_BUFFER.init([0; TX_BUFFER_SIZE]);
        let mut socket = TcpSocket::new(stack, rx, tx);
        socket.set_timeout(Some(SOCKET_TIMEOUT));
        Self { stack, socket }
    }
}

impl ErrorType for TcpBroker {
    type Error = ErrorKind;
}

impl Read for TcpBroker {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket
            .read(buf)
            .await
            .map_err(|_| ErrorKind::ConnectionReset)
    }
}

impl Write for TcpBroker {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket
            .write(buf)
            .await
            .map_err(|_| ErrorKind::ConnectionReset)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket
            .flush()
            .await
            .map_err(|_| ErrorKind::ConnectionReset)
    }
}

impl BrokerLink for TcpBroker {
    async fn open(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        // Drop whatever a previous session left behind
        self.socket.abort();

        let addresses = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                warn!("Lookup of {} failed: {}", host, e);
                TransportError::Unreachable
            })?;
        let Some(&address) = addresses.first() else {
            warn!("No address for {}", host);
            return Err(TransportError::Unreachable);
        };

        debug!("Connecting to {}:{}", address, port);
        self.socket.connect((address, port)).await.map_err(|e| {
            warn!("Connect to {}:{} failed: {}", host, port, e);
            TransportError::Unreachable
        })
    }

    fn readable(&mut self) -> Result<bool, TransportError> {
        if self.socket.can_recv() {
            Ok(true)
        } else if self.socket.may_recv() {
            Ok(false)
        } else {
            Err(TransportError::Closed)
        }
    }

    fn close(&mut self) {
        self.socket.close();
    }
}
