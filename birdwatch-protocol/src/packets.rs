//! Control packets used by the node
//!
//! Outgoing (node → broker): CONNECT, SUBSCRIBE, PUBACK, PINGREQ, DISCONNECT
//! Incoming (broker → node): CONNACK, SUBACK, PUBLISH, PINGRESP
//!
//! Anything else the broker sends decodes as [`Packet::Other`] and is ignored
//! by the session layer.

use crate::frame::{FixedHeader, PacketError, PacketType};

/// Protocol name carried in CONNECT
pub const PROTOCOL_NAME: &str = "MQTT";

/// Protocol level for MQTT 3.1.1
pub const PROTOCOL_LEVEL: u8 = 4;

/// Encoded PINGREQ packet
pub const PINGREQ: [u8; 2] = [(PacketType::PingReq as u8) << 4, 0x00];

/// Encoded DISCONNECT packet
pub const DISCONNECT: [u8; 2] = [(PacketType::Disconnect as u8) << 4, 0x00];

/// SUBACK return code signalling a refused subscription
pub const SUBACK_FAILURE: u8 = 0x80;

/// Quality of service level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// Fire and forget
    AtMostOnce = 0,
    /// Acknowledged with PUBACK
    AtLeastOnce = 1,
    /// Four-step handshake (never requested by the node)
    ExactlyOnce = 2,
}

impl QoS {
    /// Parse the two QoS bits
    pub fn from_bits(bits: u8) -> Result<Self, PacketError> {
        match bits {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(PacketError::InvalidQos),
        }
    }
}

/// CONNACK return codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReturnCode {
    Accepted,
    UnacceptableProtocolVersion,
    IdentifierRejected,
    ServerUnavailable,
    BadCredentials,
    NotAuthorized,
    /// Codes 6-255 are reserved
    Reserved(u8),
}

impl ConnectReturnCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => Self::Accepted,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadCredentials,
            5 => Self::NotAuthorized,
            other => Self::Reserved(other),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// CONNECT packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connect<'a> {
    /// Client identifier (up to 23 bytes is accepted by every broker)
    pub client_id: &'a str,
    /// Optional user name
    pub username: Option<&'a str>,
    /// Optional password (only sent together with a user name)
    pub password: Option<&'a str>,
    /// Keepalive interval in seconds
    pub keepalive_s: u16,
    /// Start without any stored session state
    pub clean_session: bool,
}

impl<'a> Connect<'a> {
    const FLAG_CLEAN_SESSION: u8 = 0x02;
    const FLAG_PASSWORD: u8 = 0x40;
    const FLAG_USERNAME: u8 = 0x80;

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= Self::FLAG_CLEAN_SESSION;
        }
        if self.username.is_some() {
            flags |= Self::FLAG_USERNAME;
        }
        if self.password.is_some() {
            flags |= Self::FLAG_PASSWORD;
        }
        flags
    }

    fn body_len(&self) -> usize {
        // Protocol name + level + flags + keepalive
        let mut len = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2;
        len += 2 + self.client_id.len();
        if let Some(username) = self.username {
            len += 2 + username.len();
        }
        if let Some(password) = self.password {
            len += 2 + password.len();
        }
        len
    }

    /// Encode this packet into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, PacketError> {
        // 3.1.1 forbids a password without a user name
        if self.password.is_some() && self.username.is_none() {
            return Err(PacketError::InvalidFlags);
        }

        let header = FixedHeader::new(PacketType::Connect, 0, self.body_len());
        let mut w = Writer::new(buffer);
        w.header(&header)?;
        w.put_str(PROTOCOL_NAME)?;
        w.put_u8(PROTOCOL_LEVEL)?;
        w.put_u8(self.flags())?;
        w.put_u16(self.keepalive_s)?;
        w.put_str(self.client_id)?;
        if let Some(username) = self.username {
            w.put_str(username)?;
        }
        if let Some(password) = self.password {
            w.put_str(password)?;
        }
        Ok(w.position())
    }
}

/// SUBSCRIBE packet for a single topic filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscribe<'a> {
    /// Non-zero packet identifier echoed in SUBACK
    pub packet_id: u16,
    /// Topic filter
    pub topic: &'a str,
    /// Requested maximum QoS
    pub qos: QoS,
}

impl<'a> Subscribe<'a> {
    /// SUBSCRIBE carries fixed flags 0b0010
    const FLAGS: u8 = 0x02;

    /// Encode this packet into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, PacketError> {
        if self.packet_id == 0 {
            return Err(PacketError::InvalidFlags);
        }

        let body_len = 2 + 2 + self.topic.len() + 1;
        let header = FixedHeader::new(PacketType::Subscribe, Self::FLAGS, body_len);
        let mut w = Writer::new(buffer);
        w.header(&header)?;
        w.put_u16(self.packet_id)?;
        w.put_str(self.topic)?;
        w.put_u8(self.qos as u8)?;
        Ok(w.position())
    }
}

/// PUBACK packet acknowledging a QoS 1 delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PubAck {
    pub packet_id: u16,
}

impl PubAck {
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, PacketError> {
        let header = FixedHeader::new(PacketType::PubAck, 0, 2);
        let mut w = Writer::new(buffer);
        w.header(&header)?;
        w.put_u16(self.packet_id)?;
        Ok(w.position())
    }
}

/// CONNACK packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

/// SUBACK packet (single topic)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubAck {
    pub packet_id: u16,
    /// Granted QoS, or [`SUBACK_FAILURE`]
    pub return_code: u8,
}

impl SubAck {
    pub fn is_granted(&self) -> bool {
        self.return_code != SUBACK_FAILURE
    }
}

/// Incoming PUBLISH packet borrowing from the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publish<'a> {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: &'a str,
    /// Present for QoS 1 and 2
    pub packet_id: Option<u16>,
    pub payload: &'a [u8],
}

/// A decoded incoming packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    ConnAck(ConnAck),
    SubAck(SubAck),
    Publish(Publish<'a>),
    PingResp,
    /// Valid packet the node has no use for
    Other(PacketType),
}

impl<'a> Packet<'a> {
    /// Decode a packet body for the given fixed header
    ///
    /// `body` must hold exactly `header.remaining_length` bytes.
    pub fn decode(header: &FixedHeader, body: &'a [u8]) -> Result<Self, PacketError> {
        if body.len() != header.remaining_length {
            return Err(PacketError::Truncated);
        }

        let mut r = Reader::new(body);
        match header.packet_type {
            PacketType::ConnAck => {
                let ack_flags = r.get_u8()?;
                let code = r.get_u8()?;
                Ok(Packet::ConnAck(ConnAck {
                    session_present: ack_flags & 0x01 != 0,
                    return_code: ConnectReturnCode::from_u8(code),
                }))
            }
            PacketType::SubAck => {
                let packet_id = r.get_u16()?;
                let return_code = r.get_u8()?;
                Ok(Packet::SubAck(SubAck {
                    packet_id,
                    return_code,
                }))
            }
            PacketType::Publish => {
                let qos = QoS::from_bits((header.flags >> 1) & 0x03)?;
                let topic = r.get_str()?;
                let packet_id = match qos {
                    QoS::AtMostOnce => None,
                    _ => Some(r.get_u16()?),
                };
                Ok(Packet::Publish(Publish {
                    dup: header.flags & 0x08 != 0,
                    qos,
                    retain: header.flags & 0x01 != 0,
                    topic,
                    packet_id,
                    payload: r.rest(),
                }))
            }
            PacketType::PingResp => Ok(Packet::PingResp),
            other => Ok(Packet::Other(other)),
        }
    }
}

/// Sequential writer over an output buffer
struct Writer<'b> {
    buffer: &'b mut [u8],
    pos: usize,
}

impl<'b> Writer<'b> {
    fn new(buffer: &'b mut [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn header(&mut self, header: &FixedHeader) -> Result<(), PacketError> {
        let len = header.encode(&mut self.buffer[self.pos..])?;
        self.pos += len;
        Ok(())
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        let end = self.pos + bytes.len();
        let dest = self
            .buffer
            .get_mut(self.pos..end)
            .ok_or(PacketError::BufferTooSmall)?;
        dest.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_u8(&mut self, value: u8) -> Result<(), PacketError> {
        self.put_bytes(&[value])
    }

    fn put_u16(&mut self, value: u16) -> Result<(), PacketError> {
        self.put_bytes(&value.to_be_bytes())
    }

    fn put_str(&mut self, value: &str) -> Result<(), PacketError> {
        let len = u16::try_from(value.len()).map_err(|_| PacketError::BufferTooSmall)?;
        self.put_u16(len)?;
        self.put_bytes(value.as_bytes())
    }
}

/// Sequential reader over a packet body
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PacketError> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + n)
            .ok_or(PacketError::Truncated)?;
        self.pos += n;
        Ok(slice)
    }

    fn get_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    fn get_u16(&mut self) -> Result<u16, PacketError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn get_str(&mut self) -> Result<&'a str, PacketError> {
        let len = self.get_u16()? as usize;
        let bytes = self.take(len)?;
        core::str::from_utf8(bytes).map_err(|_| PacketError::InvalidUtf8)
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode(bytes: &[u8]) -> Result<Packet<'_>, PacketError> {
        let (header, used) = FixedHeader::decode(bytes)?.ok_or(PacketError::Truncated)?;
        Packet::decode(&header, &bytes[used..])
    }

    #[test]
    fn test_connect_with_credentials() {
        let connect = Connect {
            client_id: "node1",
            username: Some("u"),
            password: Some("pw"),
            keepalive_s: 21_600,
            clean_session: true,
        };
        let mut buffer = [0u8; 64];
        let len = connect.encode(&mut buffer).unwrap();

        let expected: &[u8] = &[
            0x10, 24, // CONNECT, remaining length
            0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
            0x04, // level
            0xC2, // username + password + clean session
            0x54, 0x60, // keepalive 21600
            0x00, 0x05, b'n', b'o', b'd', b'e', b'1', // client id
            0x00, 0x01, b'u', // username
            0x00, 0x02, b'p', b'w', // password
        ];
        assert_eq!(&buffer[..len], expected);
    }

    #[test]
    fn test_connect_anonymous() {
        let connect = Connect {
            client_id: "a",
            username: None,
            password: None,
            keepalive_s: 60,
            clean_session: true,
        };
        let mut buffer = [0u8; 32];
        let len = connect.encode(&mut buffer).unwrap();
        assert_eq!(len, 15);
        assert_eq!(buffer[9], 0x02); // flags: clean session only
    }

    #[test]
    fn test_connect_password_without_username() {
        let connect = Connect {
            client_id: "a",
            username: None,
            password: Some("secret"),
            keepalive_s: 60,
            clean_session: true,
        };
        let mut buffer = [0u8; 32];
        assert_eq!(connect.encode(&mut buffer), Err(PacketError::InvalidFlags));
    }

    #[test]
    fn test_connect_buffer_too_small() {
        let connect = Connect {
            client_id: "a-rather-long-client-id",
            username: None,
            password: None,
            keepalive_s: 60,
            clean_session: true,
        };
        let mut buffer = [0u8; 16];
        assert_eq!(connect.encode(&mut buffer), Err(PacketError::BufferTooSmall));
    }

    #[test]
    fn test_subscribe_encode() {
        let subscribe = Subscribe {
            packet_id: 1,
            topic: "birds",
            qos: QoS::AtMostOnce,
        };
        let mut buffer = [0u8; 16];
        let len = subscribe.encode(&mut buffer).unwrap();
        assert_eq!(
            &buffer[..len],
            &[0x82, 10, 0x00, 0x01, 0x00, 0x05, b'b', b'i', b'r', b'd', b's', 0x00]
        );
    }

    #[test]
    fn test_subscribe_rejects_zero_packet_id() {
        let subscribe = Subscribe {
            packet_id: 0,
            topic: "birds",
            qos: QoS::AtMostOnce,
        };
        let mut buffer = [0u8; 16];
        assert_eq!(subscribe.encode(&mut buffer), Err(PacketError::InvalidFlags));
    }

    #[test]
    fn test_puback_encode() {
        let mut buffer = [0u8; 4];
        let len = PubAck { packet_id: 0x1234 }.encode(&mut buffer).unwrap();
        assert_eq!(&buffer[..len], &[0x40, 0x02, 0x12, 0x34]);
    }

    #[test]
    fn test_fixed_packets() {
        assert_eq!(PINGREQ, [0xC0, 0x00]);
        assert_eq!(DISCONNECT, [0xE0, 0x00]);
    }

    #[test]
    fn test_decode_connack() {
        match decode(&[0x20, 0x02, 0x00, 0x00]).unwrap() {
            Packet::ConnAck(ack) => {
                assert!(!ack.session_present);
                assert!(ack.return_code.is_accepted());
            }
            other => panic!("Wrong packet: {:?}", other),
        }

        match decode(&[0x20, 0x02, 0x01, 0x05]).unwrap() {
            Packet::ConnAck(ack) => {
                assert!(ack.session_present);
                assert_eq!(ack.return_code, ConnectReturnCode::NotAuthorized);
            }
            other => panic!("Wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_decode_suback() {
        match decode(&[0x90, 0x03, 0x00, 0x01, 0x80]).unwrap() {
            Packet::SubAck(ack) => {
                assert_eq!(ack.packet_id, 1);
                assert!(!ack.is_granted());
            }
            other => panic!("Wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_decode_publish_qos0() {
        let bytes = [
            0x31, 0x0A, 0x00, 0x05, b'b', b'i', b'r', b'd', b's', b'a', b',', b'b',
        ];
        match decode(&bytes).unwrap() {
            Packet::Publish(publish) => {
                assert_eq!(publish.topic, "birds");
                assert_eq!(publish.payload, b"a,b");
                assert_eq!(publish.qos, QoS::AtMostOnce);
                assert!(publish.retain);
                assert!(!publish.dup);
                assert_eq!(publish.packet_id, None);
            }
            other => panic!("Wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_decode_publish_qos1_has_packet_id() {
        let bytes = [0x32, 0x06, 0x00, 0x01, b't', 0x00, 0x07, b'x'];
        match decode(&bytes).unwrap() {
            Packet::Publish(publish) => {
                assert_eq!(publish.qos, QoS::AtLeastOnce);
                assert_eq!(publish.packet_id, Some(7));
                assert_eq!(publish.payload, b"x");
            }
            other => panic!("Wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_decode_publish_invalid_qos() {
        let bytes = [0x36, 0x03, 0x00, 0x01, b't'];
        assert_eq!(decode(&bytes), Err(PacketError::InvalidQos));
    }

    #[test]
    fn test_decode_publish_truncated_topic() {
        let bytes = [0x30, 0x03, 0x00, 0x05, b'b'];
        assert_eq!(decode(&bytes), Err(PacketError::Truncated));
    }

    #[test]
    fn test_decode_publish_invalid_utf8_topic() {
        let bytes = [0x30, 0x04, 0x00, 0x02, 0xC3, 0x28];
        assert_eq!(decode(&bytes), Err(PacketError::InvalidUtf8));
    }

    #[test]
    fn test_decode_pingresp_and_other() {
        assert_eq!(decode(&[0xD0, 0x00]), Ok(Packet::PingResp));
        assert_eq!(
            decode(&[0xB0, 0x02, 0x00, 0x01]),
            Ok(Packet::Other(PacketType::UnsubAck))
        );
    }

    #[test]
    fn test_decode_body_length_mismatch() {
        let header = FixedHeader::new(PacketType::ConnAck, 0, 2);
        assert_eq!(Packet::decode(&header, &[0x00]), Err(PacketError::Truncated));
    }

    proptest! {
        #[test]
        fn prop_publish_decode_never_panics(flags in 0u8..16, body in proptest::collection::vec(any::<u8>(), 0..64)) {
            let header = FixedHeader::new(PacketType::Publish, flags, body.len());
            let _ = Packet::decode(&header, &body);
        }
    }
}
