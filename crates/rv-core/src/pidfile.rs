//! Single-instance bookkeeping for the daemon
//!
//! `revsocks run` records its PID for as long as it serves; `revsocks start`
//! and a second `run` consult the record before launching anything.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config;

const PID_FILE_NAME: &str = "revsocks.pid";

/// `<config_dir>/revsocks/revsocks.pid`
pub fn default_pid_path() -> PathBuf {
    config::default_config_dir().join(PID_FILE_NAME)
}

/// PID of a live daemon recorded at `path`
///
/// A record naming a process that no longer exists is deleted and
/// reported as `None`. Unreadable contents are an `InvalidData` error.
pub fn running_pid(path: &Path) -> io::Result<Option<u32>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let pid: u32 = contents
        .trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if process_exists(pid) {
        return Ok(Some(pid));
    }
    tracing::debug!(pid, path = %path.display(), "removing stale PID file");
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(None),
    }
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Signal 0 only probes; EPERM still means the process is there
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(windows)]
fn process_exists(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
    if handle == 0 {
        return false;
    }
    unsafe { CloseHandle(handle) };
    true
}

/// The running daemon's PID record, deleted on drop
#[derive(Debug)]
pub struct PidFileGuard {
    path: PathBuf,
}

impl PidFileGuard {
    /// Record `pid` at `path`, creating parent directories
    pub fn create(path: PathBuf, pid: u32) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, format!("{pid}\n"))?;
        Ok(Self { path })
    }

    /// Record this process at the default location
    pub fn for_current_process() -> io::Result<Self> {
        Self::create(default_pid_path(), std::process::id())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove PID file");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_record_means_not_running() {
        let dir = TempDir::new().unwrap();
        assert_eq!(running_pid(&dir.path().join("revsocks.pid")).unwrap(), None);
    }

    #[test]
    fn test_guard_records_live_process_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("revsocks.pid");

        let guard = PidFileGuard::create(path.clone(), std::process::id()).unwrap();
        assert_eq!(guard.path(), path);
        assert_eq!(running_pid(&path).unwrap(), Some(std::process::id()));

        drop(guard);
        assert!(!path.exists());
        assert_eq!(running_pid(&path).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_process_record_is_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("revsocks.pid");

        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        fs::write(&path, format!("{pid}\n")).unwrap();

        assert_eq!(running_pid(&path).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_garbage_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("revsocks.pid");
        fs::write(&path, "not a pid").unwrap();

        let err = running_pid(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
