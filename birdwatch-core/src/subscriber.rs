//! Message subscriber
//!
//! A subscribe-only broker session on top of a [`BrokerLink`]. The session
//! never runs in the background: the owner calls [`Subscriber::poll`], which
//! reads at most one pending packet and hands PUBLISH deliveries to the
//! registered [`MessageHandler`] before returning.
//!
//! Transport faults are returned to the caller as [`TransportError`] and are
//! never retried here.

use birdwatch_protocol::{
    ConnectReturnCode, Connect, FixedHeader, HeaderParser, Packet, PacketError, PacketType,
    PubAck, QoS, Subscribe, DISCONNECT, MAX_PACKET_SIZE, PINGREQ,
};
use embedded_io_async::{Error as _, ErrorKind, ReadExactError};

use crate::traits::BrokerLink;

/// Default broker port
pub const DEFAULT_PORT: u16 = 1883;

/// Default keepalive: six hours
pub const DEFAULT_KEEPALIVE_S: u16 = 6 * 60 * 60;

/// Packet identifier used for the single SUBSCRIBE
const SUBSCRIBE_PACKET_ID: u16 = 1;

/// Broker session failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Host could not be resolved or connected to
    Unreachable,
    /// Read or write failed
    Io(ErrorKind),
    /// Peer closed the connection
    Closed,
    /// Broker refused the session
    Refused(ConnectReturnCode),
    /// Broker sent bytes that do not decode
    Protocol(PacketError),
    /// Broker answered CONNECT with something other than CONNACK
    UnexpectedPacket(PacketType),
    /// A topic is already subscribed on this session
    AlreadySubscribed,
}

impl From<PacketError> for TransportError {
    fn from(e: PacketError) -> Self {
        TransportError::Protocol(e)
    }
}

impl<E: embedded_io_async::Error> From<ReadExactError<E>> for TransportError {
    fn from(e: ReadExactError<E>) -> Self {
        match e {
            ReadExactError::UnexpectedEof => TransportError::Closed,
            ReadExactError::Other(e) => TransportError::Io(e.kind()),
        }
    }
}

/// Receives PUBLISH deliveries from [`Subscriber::poll`]
pub trait MessageHandler {
    /// Called once per delivered message
    ///
    /// Runs inside `poll()`, so it must not wait on anything but the
    /// devices it owns.
    async fn on_message(&mut self, topic: &str, payload: &[u8]);
}

/// Session parameters sent in CONNECT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub keepalive_s: u16,
}

impl<'a> SessionOptions<'a> {
    /// Anonymous session with the default keepalive
    pub fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            username: None,
            password: None,
            keepalive_s: DEFAULT_KEEPALIVE_S,
        }
    }

    pub fn with_credentials(mut self, username: &'a str, password: Option<&'a str>) -> Self {
        self.username = Some(username);
        self.password = password;
        self
    }

    pub fn with_keepalive(mut self, keepalive_s: u16) -> Self {
        self.keepalive_s = keepalive_s;
        self
    }
}

/// An open broker session
pub struct Subscriber<'l, L, H> {
    link: &'l mut L,
    handler: Option<H>,
    subscribed: bool,
    buffer: [u8; MAX_PACKET_SIZE],
}

impl<'l, L, H> Subscriber<'l, L, H>
where
    L: BrokerLink,
    H: MessageHandler,
{
    /// Connect to the broker and start a clean session
    ///
    /// Waits for CONNACK; a rejected session is [`TransportError::Refused`].
    /// A handshake that fails after the link opened closes the link again.
    pub async fn open(
        link: &'l mut L,
        host: &str,
        port: u16,
        options: &SessionOptions<'_>,
    ) -> Result<Self, TransportError> {
        info!("Opening broker session to {}:{}", host, port);
        link.open(host, port).await?;

        let mut session = Self {
            link,
            handler: None,
            subscribed: false,
            buffer: [0; MAX_PACKET_SIZE],
        };

        match session.handshake(options).await {
            Ok(()) => {
                info!("Broker session accepted");
                Ok(session)
            }
            Err(e) => {
                session.close();
                Err(e)
            }
        }
    }

    /// CONNECT, then require an accepting CONNACK
    async fn handshake(&mut self, options: &SessionOptions<'_>) -> Result<(), TransportError> {
        let connect = Connect {
            client_id: options.client_id,
            username: options.username,
            password: options.password,
            keepalive_s: options.keepalive_s,
            clean_session: true,
        };
        let len = connect.encode(&mut self.buffer)?;
        self.send_buffer(len).await?;

        let header = self.read_header().await?;
        if header.packet_type != PacketType::ConnAck {
            warn!("Expected CONNACK, got {}", header.packet_type);
            return Err(TransportError::UnexpectedPacket(header.packet_type));
        }
        let len = self
            .read_body(&header)
            .await?
            .ok_or(TransportError::Protocol(PacketError::Truncated))?;
        let ack = match Packet::decode(&header, &self.buffer[..len])? {
            Packet::ConnAck(ack) => ack,
            _ => return Err(TransportError::UnexpectedPacket(header.packet_type)),
        };
        if !ack.return_code.is_accepted() {
            warn!("Broker refused session: {}", ack.return_code);
            return Err(TransportError::Refused(ack.return_code));
        }
        Ok(())
    }

    /// Register the message handler, replacing any previous one
    pub fn set_handler(&mut self, handler: H) {
        self.handler = Some(handler);
    }

    /// Subscribe to `topic` at QoS 0
    ///
    /// Does not wait for SUBACK; it is consumed by a later `poll()`.
    pub async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if self.subscribed {
            return Err(TransportError::AlreadySubscribed);
        }

        let subscribe = Subscribe {
            packet_id: SUBSCRIBE_PACKET_ID,
            topic,
            qos: QoS::AtMostOnce,
        };
        let len = subscribe.encode(&mut self.buffer)?;
        self.send_buffer(len).await?;
        self.subscribed = true;
        info!("Subscribed to {}", topic);
        Ok(())
    }

    /// Process at most one pending inbound packet
    ///
    /// Returns immediately when nothing is waiting. A PUBLISH is handed to
    /// the handler before this returns.
    pub async fn poll(&mut self) -> Result<(), TransportError> {
        if !self.link.readable()? {
            return Ok(());
        }

        let header = self.read_header().await?;
        let Some(len) = self.read_body(&header).await? else {
            return Ok(());
        };

        match Packet::decode(&header, &self.buffer[..len])? {
            Packet::Publish(publish) => {
                debug!("Message on {} ({} bytes)", publish.topic, publish.payload.len());
                if let Some(handler) = self.handler.as_mut() {
                    handler.on_message(publish.topic, publish.payload).await;
                }
                if let (QoS::AtLeastOnce, Some(packet_id)) = (publish.qos, publish.packet_id) {
                    let mut ack = [0u8; 4];
                    let len = PubAck { packet_id }.encode(&mut ack)?;
                    send(self.link, &ack[..len]).await?;
                }
            }
            Packet::SubAck(ack) => {
                if ack.is_granted() {
                    debug!("Subscription granted");
                } else {
                    warn!("Subscription refused by broker");
                }
            }
            Packet::PingResp => trace!("PINGRESP"),
            Packet::ConnAck(_) => warn!("Ignoring CONNACK on open session"),
            Packet::Other(packet_type) => debug!("Ignoring {}", packet_type),
        }
        Ok(())
    }

    /// Send PINGREQ to keep an idle session alive
    pub async fn ping(&mut self) -> Result<(), TransportError> {
        trace!("PINGREQ");
        send(self.link, &PINGREQ).await
    }

    /// Tell the broker the session is ending
    ///
    /// Waits on the link like any other write; bound it if the link may be
    /// stalled. Follow with [`Subscriber::close`].
    pub async fn disconnect(&mut self) -> Result<(), TransportError> {
        debug!("DISCONNECT");
        send(self.link, &DISCONNECT).await
    }

    /// Drop the connection
    pub fn close(self) {
        self.link.close();
    }

    async fn send_buffer(&mut self, len: usize) -> Result<(), TransportError> {
        send(self.link, &self.buffer[..len]).await
    }

    async fn read_header(&mut self) -> Result<FixedHeader, TransportError> {
        let mut parser = HeaderParser::new();
        let mut byte = [0u8; 1];
        loop {
            self.link.read_exact(&mut byte).await?;
            if let Some(header) = parser.feed(byte[0])? {
                return Ok(header);
            }
        }
    }

    /// Read a packet body into the buffer
    ///
    /// Returns the body length, or `None` for a body larger than the buffer,
    /// which is read off the wire and discarded.
    async fn read_body(&mut self, header: &FixedHeader) -> Result<Option<usize>, TransportError> {
        let len = header.remaining_length;
        if len > self.buffer.len() {
            warn!("Dropping oversized {} ({} bytes)", header.packet_type, len);
            self.discard(len).await?;
            return Ok(None);
        }

        self.link.read_exact(&mut self.buffer[..len]).await?;
        Ok(Some(len))
    }

    async fn discard(&mut self, mut remaining: usize) -> Result<(), TransportError> {
        while remaining > 0 {
            let chunk = remaining.min(self.buffer.len());
            self.link.read_exact(&mut self.buffer[..chunk]).await?;
            remaining -= chunk;
        }
        Ok(())
    }
}

async fn send<L: BrokerLink>(link: &mut L, bytes: &[u8]) -> Result<(), TransportError> {
    link.write_all(bytes)
        .await
        .map_err(|e| TransportError::Io(e.kind()))?;
    link.flush().await.map_err(|e| TransportError::Io(e.kind()))
}
