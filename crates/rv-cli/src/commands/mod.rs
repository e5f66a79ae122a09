//! CLI command implementations

mod close;
mod list;
mod run;
mod start;
mod stop;

pub use close::close_command;
pub use list::list_command;
pub use run::{run_command, ServeArgs};
pub use start::start_command;
pub use stop::stop_command;

use std::path::Path;

use anyhow::{Context, Result};

use rv_core::config::{self, ServerConfig};
use rv_core::control::ControlEndpoint;

/// Load the server configuration and apply the global overrides
///
/// An explicit `--config` must exist; the default path may be absent.
pub fn resolve_config(
    path: Option<&Path>,
    control: Option<&ControlEndpoint>,
) -> Result<ServerConfig> {
    let mut config = match path {
        Some(path) => config::load_config::<config::ConfigFile>(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?
            .server,
        None => {
            let default_path = config::default_config_path();
            config::load_server_config(&default_path)
                .with_context(|| format!("Failed to load config from {:?}", default_path))?
        }
    };

    if let Some(control) = control {
        config.control = control.clone();
    }
    Ok(config)
}
