//! Start command implementation (detached daemon)

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use rv_core::control::ControlEndpoint;
use rv_core::pidfile::{default_pid_path, running_pid};

use super::ServeArgs;
use crate::output::print_success;

/// Re-spawn ourselves as `revsocks run` with null stdio
pub fn start_command(
    serve: &ServeArgs,
    config_path: Option<&Path>,
    control: Option<&ControlEndpoint>,
) -> Result<()> {
    if let Some(pid) = running_pid(&default_pid_path())? {
        anyhow::bail!("revsocks is already running (PID: {})", pid);
    }

    let exe = std::env::current_exe().context("Failed to locate the revsocks executable")?;
    let mut cmd = Command::new(exe);
    if let Some(path) = config_path {
        cmd.arg("--config").arg(path);
    }
    if let Some(control) = control {
        cmd.arg("--control").arg(control.to_string());
    }
    cmd.arg("run").args(serve.to_args());

    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to launch revsocks")?;

    print_success(&format!("revsocks started (PID: {})", child.id()));
    Ok(())
}
