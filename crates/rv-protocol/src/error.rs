//! Multiplexer error types

use std::time::Duration;

use thiserror::Error;

use crate::frame::StreamId;

/// Errors that can occur while running a multiplexed session
#[derive(Error, Debug)]
pub enum MuxError {
    /// Frame header carried an unsupported protocol version
    #[error("Invalid protocol version: {0}")]
    InvalidVersion(u8),

    /// Unknown frame type
    #[error("Unknown frame type: {0}")]
    UnknownFrameType(u8),

    /// Data frame larger than anything the receiver could have granted
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Peer sent more data than the stream's receive window allowed
    #[error("Flow control violation on {0}")]
    FlowControlViolation(StreamId),

    /// Peer opened a stream with an id it is not allowed to use
    #[error("Invalid stream id from peer: {0}")]
    InvalidStreamId(StreamId),

    /// Peer announced it is going away
    #[error("Remote closed the session (code {0})")]
    RemoteGoAway(u32),

    /// Session is closed and can no longer be used
    #[error("Session closed")]
    SessionClosed,

    /// Stream was reset by either side
    #[error("Stream reset: {0}")]
    StreamReset(StreamId),

    /// Too many concurrently open streams
    #[error("Stream limit reached ({0} streams)")]
    TooManyStreams(usize),

    /// No ping answer within the configured timeout
    #[error("Ping timed out after {0:?}")]
    PingTimeout(Duration),

    /// Session configuration rejected
    #[error("Invalid multiplexer config: {0}")]
    InvalidConfig(String),

    /// I/O error on the underlying connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
