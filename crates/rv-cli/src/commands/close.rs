//! Close command implementation

use anyhow::Result;

use crate::control::{ClientError, ControlClient};
use crate::output::{print_error, print_success};

/// Close one tunnel by id
pub async fn close_command(client: &ControlClient, id: &str) -> Result<()> {
    match client.close_connection(id).await {
        Ok(()) => {
            print_success(&format!("Closed connection {}", id));
            Ok(())
        }
        Err(e @ ClientError::NotFound(_)) => {
            print_error(&e.to_string());
            Err(e.into())
        }
        Err(e) => {
            print_error(&format!("Failed to close connection {}: {}", id, e));
            Err(e.into())
        }
    }
}
