//! Fixed header encoding and decoding.
//!
//! Every control packet starts with a fixed header:
//! - TYPE/FLAGS (1 byte): packet type in the high nibble, flags in the low nibble
//! - REMAINING LENGTH (1-4 bytes): length of variable header + payload,
//!   7 bits per byte, least significant group first, bit 7 = continuation

/// Largest value the remaining length field can carry
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Maximum number of bytes used by the remaining length field
pub const MAX_LENGTH_BYTES: usize = 4;

/// Maximum fixed header size (TYPE/FLAGS + REMAINING LENGTH)
pub const MAX_HEADER_SIZE: usize = 1 + MAX_LENGTH_BYTES;

/// Errors that can occur during packet encoding or decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketError {
    /// Buffer too small for encoding
    BufferTooSmall,
    /// Remaining length uses more than four bytes or exceeds the maximum
    MalformedLength,
    /// Unknown packet type nibble
    InvalidType(u8),
    /// Flags not allowed for this packet type
    InvalidFlags,
    /// Packet body ended before all fields were read
    Truncated,
    /// Topic or string field is not valid UTF-8
    InvalidUtf8,
    /// QoS bits set to the reserved value 3
    InvalidQos,
}

/// Control packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Parse the high nibble of the first header byte
    pub fn from_nibble(nibble: u8) -> Result<Self, PacketError> {
        use PacketType::*;

        Ok(match nibble {
            1 => Connect,
            2 => ConnAck,
            3 => Publish,
            4 => PubAck,
            5 => PubRec,
            6 => PubRel,
            7 => PubComp,
            8 => Subscribe,
            9 => SubAck,
            10 => Unsubscribe,
            11 => UnsubAck,
            12 => PingReq,
            13 => PingResp,
            14 => Disconnect,
            other => return Err(PacketError::InvalidType(other)),
        })
    }
}

/// A parsed or constructed fixed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FixedHeader {
    /// Packet type
    pub packet_type: PacketType,
    /// Low nibble flags (only meaningful for PUBLISH)
    pub flags: u8,
    /// Number of bytes following the fixed header
    pub remaining_length: usize,
}

impl FixedHeader {
    /// Create a header for an outgoing packet
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: usize) -> Self {
        Self {
            packet_type,
            flags: flags & 0x0F,
            remaining_length,
        }
    }

    /// First byte on the wire
    pub fn first_byte(&self) -> u8 {
        ((self.packet_type as u8) << 4) | self.flags
    }

    /// Number of bytes this header occupies when encoded
    pub fn encoded_len(&self) -> usize {
        1 + remaining_length_size(self.remaining_length)
    }

    /// Total packet size (header + body)
    pub fn packet_len(&self) -> usize {
        self.encoded_len() + self.remaining_length
    }

    /// Encode this header into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, PacketError> {
        if buffer.is_empty() {
            return Err(PacketError::BufferTooSmall);
        }
        buffer[0] = self.first_byte();
        let len = encode_remaining_length(self.remaining_length, &mut buffer[1..])?;
        Ok(1 + len)
    }

    /// Decode a header from the start of a byte slice
    ///
    /// Returns `Ok(None)` if more bytes are needed, otherwise the header and
    /// the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<Option<(Self, usize)>, PacketError> {
        let Some(&first) = bytes.first() else {
            return Ok(None);
        };
        let packet_type = PacketType::from_nibble(first >> 4)?;

        match decode_remaining_length(&bytes[1..])? {
            Some((remaining_length, used)) => Ok(Some((
                Self {
                    packet_type,
                    flags: first & 0x0F,
                    remaining_length,
                },
                1 + used,
            ))),
            None => Ok(None),
        }
    }
}

/// Number of bytes needed to encode a remaining length value
pub fn remaining_length_size(len: usize) -> usize {
    match len {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Encode a remaining length value
///
/// Returns the number of bytes written
pub fn encode_remaining_length(len: usize, buffer: &mut [u8]) -> Result<usize, PacketError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(PacketError::MalformedLength);
    }

    let mut value = len;
    let mut written = 0;
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }

        let slot = buffer.get_mut(written).ok_or(PacketError::BufferTooSmall)?;
        *slot = byte;
        written += 1;

        if value == 0 {
            return Ok(written);
        }
    }
}

/// Decode a remaining length value from the start of a byte slice
///
/// Returns `Ok(None)` if the slice ends before the last length byte.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<Option<(usize, usize)>, PacketError> {
    let mut parser = LengthParser::new();
    for (i, &byte) in bytes.iter().enumerate() {
        if let Some(len) = parser.feed(byte)? {
            return Ok(Some((len, i + 1)));
        }
    }
    Ok(None)
}

/// Incremental remaining length decoder
#[derive(Debug, Clone)]
struct LengthParser {
    value: usize,
    multiplier: usize,
    count: usize,
}

impl LengthParser {
    fn new() -> Self {
        Self {
            value: 0,
            multiplier: 1,
            count: 0,
        }
    }

    fn feed(&mut self, byte: u8) -> Result<Option<usize>, PacketError> {
        if self.count == MAX_LENGTH_BYTES {
            return Err(PacketError::MalformedLength);
        }
        self.value += (byte & 0x7F) as usize * self.multiplier;
        self.multiplier *= 128;
        self.count += 1;

        if byte & 0x80 == 0 {
            Ok(Some(self.value))
        } else if self.count == MAX_LENGTH_BYTES {
            Err(PacketError::MalformedLength)
        } else {
            Ok(None)
        }
    }
}

/// State machine for reading a fixed header off a byte stream
///
/// The stream reader feeds one byte at a time until a complete header is
/// available, then reads `remaining_length` body bytes itself.
#[derive(Debug, Clone)]
pub struct HeaderParser {
    first: Option<u8>,
    length: LengthParser,
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderParser {
    /// Create a new header parser
    pub fn new() -> Self {
        Self {
            first: None,
            length: LengthParser::new(),
        }
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.first = None;
        self.length = LengthParser::new();
    }

    /// Feed a single byte to the parser
    ///
    /// Returns `Ok(Some(header))` once the header is complete,
    /// `Ok(None)` when more bytes are needed, or `Err` on a malformed header.
    /// The parser resets itself after a complete header or an error.
    pub fn feed(&mut self, byte: u8) -> Result<Option<FixedHeader>, PacketError> {
        let Some(first) = self.first else {
            if let Err(e) = PacketType::from_nibble(byte >> 4) {
                self.reset();
                return Err(e);
            }
            self.first = Some(byte);
            return Ok(None);
        };

        match self.length.feed(byte) {
            Ok(Some(remaining_length)) => {
                self.reset();
                // Type nibble was validated when the first byte arrived
                let packet_type = PacketType::from_nibble(first >> 4)?;
                Ok(Some(FixedHeader {
                    packet_type,
                    flags: first & 0x0F,
                    remaining_length,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_remaining_length_boundaries() {
        let cases: [(usize, &[u8]); 6] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16_383, &[0xFF, 0x7F]),
            (16_384, &[0x80, 0x80, 0x01]),
            (MAX_REMAINING_LENGTH, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];

        for (value, expected) in cases {
            let mut buffer = [0u8; 4];
            let len = encode_remaining_length(value, &mut buffer).unwrap();
            assert_eq!(&buffer[..len], expected);
            assert_eq!(remaining_length_size(value), expected.len());
        }
    }

    #[test]
    fn test_remaining_length_too_large() {
        let mut buffer = [0u8; 4];
        assert_eq!(
            encode_remaining_length(MAX_REMAINING_LENGTH + 1, &mut buffer),
            Err(PacketError::MalformedLength)
        );
    }

    #[test]
    fn test_remaining_length_five_bytes_rejected() {
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x01];
        assert_eq!(
            decode_remaining_length(&bytes),
            Err(PacketError::MalformedLength)
        );
    }

    #[test]
    fn test_header_decode_incomplete() {
        assert_eq!(FixedHeader::decode(&[]), Ok(None));
        assert_eq!(FixedHeader::decode(&[0x30, 0x80]), Ok(None));
    }

    #[test]
    fn test_header_decode_publish() {
        let (header, used) = FixedHeader::decode(&[0x32, 0x90, 0x01, 0xAA]).unwrap().unwrap();
        assert_eq!(used, 3);
        assert_eq!(header.packet_type, PacketType::Publish);
        assert_eq!(header.flags, 0x02);
        assert_eq!(header.remaining_length, 144);
    }

    #[test]
    fn test_header_rejects_reserved_type() {
        assert_eq!(FixedHeader::decode(&[0x00, 0x00]), Err(PacketError::InvalidType(0)));
        assert_eq!(FixedHeader::decode(&[0xF0, 0x00]), Err(PacketError::InvalidType(15)));
    }

    #[test]
    fn test_header_parser_byte_by_byte() {
        let mut parser = HeaderParser::new();
        assert_eq!(parser.feed(0xD0), Ok(None));
        let header = parser.feed(0x00).unwrap().unwrap();
        assert_eq!(header.packet_type, PacketType::PingResp);
        assert_eq!(header.remaining_length, 0);

        // Parser is ready for the next packet
        assert_eq!(parser.feed(0x20), Ok(None));
        let header = parser.feed(0x02).unwrap().unwrap();
        assert_eq!(header.packet_type, PacketType::ConnAck);
        assert_eq!(header.remaining_length, 2);
    }

    #[test]
    fn test_header_parser_resets_after_error() {
        let mut parser = HeaderParser::new();
        assert_eq!(parser.feed(0x0F), Err(PacketError::InvalidType(0)));
        assert_eq!(parser.feed(0x90), Ok(None));
        assert_eq!(parser.feed(0x03).unwrap().unwrap().packet_type, PacketType::SubAck);
    }

    #[test]
    fn test_header_encode() {
        let header = FixedHeader::new(PacketType::Subscribe, 0x02, 200);
        let mut buffer = [0u8; MAX_HEADER_SIZE];
        let len = header.encode(&mut buffer).unwrap();
        assert_eq!(len, 3);
        assert_eq!(&buffer[..3], &[0x82, 0xC8, 0x01]);
        assert_eq!(header.encoded_len(), 3);
        assert_eq!(header.packet_len(), 203);
    }

    proptest! {
        #[test]
        fn prop_remaining_length_decodes_to_encoded(len in 0usize..=MAX_REMAINING_LENGTH) {
            let mut buffer = [0u8; 4];
            let written = encode_remaining_length(len, &mut buffer).unwrap();
            prop_assert_eq!(decode_remaining_length(&buffer[..written]), Ok(Some((len, written))));
        }
    }
}
