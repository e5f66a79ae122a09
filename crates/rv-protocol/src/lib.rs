//! rv-protocol: Stream multiplexing for revsocks agent tunnels
//!
//! Implements the yamux framing and session layer spoken by revsocks
//! agents. One physical connection carries many independently
//! flow-controlled logical streams plus a ping primitive used for
//! liveness probing.

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod session;
pub mod stream;

pub use codec::{Frame, FrameCodec};
pub use config::{Mode, MuxConfig, DEFAULT_WINDOW};
pub use error::MuxError;
pub use frame::{Flags, FrameHeader, FrameType, GoAwayCode, StreamId, HEADER_SIZE, PROTOCOL_VERSION};
pub use session::Session;
pub use stream::MuxStream;
