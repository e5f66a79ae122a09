//! Connection management

mod health;
mod pump;
mod registry;

pub use health::HealthMonitor;
pub use pump::spawn_pump;
pub use registry::Registry;
