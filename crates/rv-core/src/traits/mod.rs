//! Core trait definitions

mod tunnel;

pub use tunnel::TunnelHandle;
