//! Frame header encoding/decoding
//!
//! Every yamux frame starts with a 12-byte big-endian header:
//! - version: 1 byte (always 0)
//! - type: 1 byte (data, window update, ping, go away)
//! - flags: 2 bytes (SYN, ACK, FIN, RST)
//! - stream_id: 4 bytes (0 is reserved for session-level frames)
//! - length: 4 bytes (payload length for data, delta/opaque/code otherwise)

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::MuxError;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 12;

/// The only protocol version in use
pub const PROTOCOL_VERSION: u8 = 0;

/// Identifier of a logical stream within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

impl StreamId {
    /// Stream id used by session-level frames (ping, go away)
    pub const SESSION: StreamId = StreamId(0);

    /// Create a new stream ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether this id belongs to the client-initiated (odd) space
    pub fn is_client(&self) -> bool {
        self.0 % 2 == 1
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Kind of frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Stream payload; length is the payload size
    Data = 0,
    /// Flow-control credit; length is the window delta
    WindowUpdate = 1,
    /// Liveness probe; length is an opaque value echoed back
    Ping = 2,
    /// Session termination; length is the reason code
    GoAway = 3,
}

impl FrameType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Data),
            1 => Some(Self::WindowUpdate),
            2 => Some(Self::Ping),
            3 => Some(Self::GoAway),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Frame flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u16);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Opens a stream, or marks a ping request
    pub const SYN: Flags = Flags(0x1);
    /// Acknowledges a stream open, or marks a ping reply
    pub const ACK: Flags = Flags(0x2);
    /// Half-closes the sender's side of a stream
    pub const FIN: Flags = Flags(0x4);
    /// Aborts a stream immediately
    pub const RST: Flags = Flags(0x8);

    pub fn contains(&self, other: Flags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

/// Reason codes carried by a go away frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GoAwayCode {
    Normal = 0,
    ProtocolError = 1,
    InternalError = 2,
}

/// Frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub flags: Flags,
    pub stream_id: StreamId,
    pub length: u32,
}

impl FrameHeader {
    /// Create a new frame header
    pub fn new(frame_type: FrameType, flags: Flags, stream_id: StreamId, length: u32) -> Self {
        Self {
            frame_type,
            flags,
            stream_id,
            length,
        }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u8(self.frame_type.as_u8());
        dst.put_u16(self.flags.bits());
        dst.put_u32(self.stream_id.as_u32());
        dst.put_u32(self.length);
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    /// Returns Err on an unsupported version or unknown frame type.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, MuxError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Validate before consuming anything
        if src[0] != PROTOCOL_VERSION {
            return Err(MuxError::InvalidVersion(src[0]));
        }
        let frame_type = FrameType::from_u8(src[1]).ok_or(MuxError::UnknownFrameType(src[1]))?;

        src.advance(2);
        let flags = Flags(src.get_u16());
        let stream_id = StreamId::new(src.get_u32());
        let length = src.get_u32();

        Ok(Some(Self {
            frame_type,
            flags,
            stream_id,
            length,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_wire_layout() {
        let header = FrameHeader::new(
            FrameType::WindowUpdate,
            Flags::SYN | Flags::ACK,
            StreamId::new(3),
            0x0004_0000,
        );

        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(
            &buf[..],
            &[0, 1, 0, 3, 0, 0, 0, 3, 0, 4, 0, 0][..],
            "header must be big-endian version/type/flags/id/length"
        );

        let decoded = FrameHeader::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, header);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_insufficient_bytes() {
        let mut buf = BytesMut::from(&[0u8; HEADER_SIZE - 1][..]);
        assert!(FrameHeader::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE - 1, "partial header must not be consumed");
    }

    #[test]
    fn test_invalid_version() {
        let mut buf = BytesMut::from(&[1u8, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0][..]);
        assert!(matches!(
            FrameHeader::decode(&mut buf),
            Err(MuxError::InvalidVersion(1))
        ));
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut buf = BytesMut::from(&[0u8, 9, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0][..]);
        assert!(matches!(
            FrameHeader::decode(&mut buf),
            Err(MuxError::UnknownFrameType(9))
        ));
    }

    #[test]
    fn test_flags() {
        let flags = Flags::ACK | Flags::FIN;
        assert!(flags.contains(Flags::ACK));
        assert!(flags.contains(Flags::FIN));
        assert!(!flags.contains(Flags::SYN));
        assert!(!flags.contains(Flags::NONE));
    }

    #[test]
    fn test_stream_id_parity() {
        assert!(StreamId::new(1).is_client());
        assert!(!StreamId::new(2).is_client());
        assert_eq!(StreamId::new(7).to_string(), "stream-7");
    }
}
