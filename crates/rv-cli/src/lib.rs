//! revsocks CLI
//!
//! Runs the tunnel server and manages it through its control endpoint.

pub mod commands;
pub mod control;
pub mod output;
