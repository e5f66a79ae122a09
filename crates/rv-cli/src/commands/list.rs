//! List command implementation

use anyhow::Result;

use crate::control::ControlClient;
use crate::output::{format_connections, print_error};

/// Print the daemon's live tunnels
pub async fn list_command(client: &ControlClient) -> Result<()> {
    let connections = match client.list_connections().await {
        Ok(c) => c,
        Err(e) => {
            print_error(&format!("Failed to list connections: {}", e));
            return Err(e.into());
        }
    };

    println!("{}", format_connections(&connections));
    Ok(())
}
