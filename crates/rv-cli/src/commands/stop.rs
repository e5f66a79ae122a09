//! Stop command implementation

use anyhow::Result;

use crate::control::{ClientError, ControlClient};
use crate::output::{print_error, print_info, print_success, print_warning};

/// Ask the daemon to shut down
pub async fn stop_command(client: &ControlClient) -> Result<()> {
    print_info("Stopping revsocks...");
    match client.shutdown().await {
        Ok(status) => {
            print_success(&format!("revsocks is {}", status));
            Ok(())
        }
        Err(ClientError::Unreachable { .. }) => {
            print_warning("revsocks is not running");
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to stop revsocks: {}", e));
            Err(e.into())
        }
    }
}
