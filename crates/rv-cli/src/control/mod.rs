//! Client side of the control plane
//!
//! The daemon serves HTTP/1.1 on either a Unix socket or a loopback TCP
//! port; the client speaks to whichever endpoint is configured.

mod client;

pub use client::{ClientError, ControlClient};
