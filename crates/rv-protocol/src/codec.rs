//! Tokio codec for yamux frames

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::DEFAULT_WINDOW;
use crate::error::MuxError;
use crate::frame::{Flags, FrameHeader, FrameType, GoAwayCode, StreamId, HEADER_SIZE};

/// A complete frame with header and payload
///
/// Only data frames carry a body; for every other type the header's
/// length field holds the frame's value (window delta, ping opaque,
/// go away code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
}

impl Frame {
    /// Data frame carrying `body` on `stream_id`
    pub fn data(stream_id: StreamId, flags: Flags, body: Bytes) -> Self {
        Self {
            header: FrameHeader::new(FrameType::Data, flags, stream_id, body.len() as u32),
            body,
        }
    }

    /// Window update granting `delta` extra bytes of credit
    pub fn window_update(stream_id: StreamId, flags: Flags, delta: u32) -> Self {
        Self {
            header: FrameHeader::new(FrameType::WindowUpdate, flags, stream_id, delta),
            body: Bytes::new(),
        }
    }

    /// Ping request (SYN) or reply (ACK) carrying an opaque value
    pub fn ping(flags: Flags, opaque: u32) -> Self {
        Self {
            header: FrameHeader::new(FrameType::Ping, flags, StreamId::SESSION, opaque),
            body: Bytes::new(),
        }
    }

    /// Session termination with a reason code
    pub fn go_away(code: GoAwayCode) -> Self {
        Self {
            header: FrameHeader::new(FrameType::GoAway, Flags::NONE, StreamId::SESSION, code as u32),
            body: Bytes::new(),
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.header.stream_id
    }

    pub fn flags(&self) -> Flags {
        self.header.flags
    }
}

/// Codec for encoding/decoding yamux frames
#[derive(Debug)]
pub struct FrameCodec {
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
    /// Largest data payload accepted from the peer
    max_body: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW as usize)
    }
}

impl FrameCodec {
    /// Create a codec that rejects data frames larger than `max_body`
    pub fn new(max_body: usize) -> Self {
        Self {
            pending_header: None,
            max_body,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = MuxError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => {
                    src.reserve(HEADER_SIZE);
                    return Ok(None);
                }
            },
        };

        if header.frame_type != FrameType::Data {
            return Ok(Some(Frame {
                header,
                body: Bytes::new(),
            }));
        }

        let body_len = header.length as usize;
        if body_len > self.max_body {
            return Err(MuxError::FrameTooLarge {
                size: body_len,
                max: self.max_body,
            });
        }

        if src.len() < body_len {
            src.reserve(body_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let body = src.split_to(body_len).freeze();
        Ok(Some(Frame { header, body }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = MuxError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame.header.encode(dst);
        if frame.header.frame_type == FrameType::Data {
            dst.extend_from_slice(&frame.body);
        }
        Ok(())
    }
}
