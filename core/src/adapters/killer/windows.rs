//! Windows tree killer using `taskkill /T`.

use tokio::process::Command;
use tracing::debug;

use crate::domain::{KillSignal, Pid};
use crate::error::KillError;

pub struct WindowsTreeKiller;

impl WindowsTreeKiller {
    pub fn new() -> Self {
        Self
    }

    pub async fn kill_tree(&self, pid: Pid, signal: KillSignal) -> Result<(), KillError> {
        let pid_arg = pid.to_string();
        let mut args = vec!["/PID", pid_arg.as_str(), "/T"];
        if signal == KillSignal::Kill {
            args.push("/F");
        }

        debug!(pid = %pid, signal = %signal, "Running taskkill");
        let output = Command::new("taskkill").args(&args).output().await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not found") {
            return Err(KillError::ProcessNotFound(pid.as_u32()));
        }
        if stderr.contains("Access is denied") {
            return Err(KillError::PermissionDenied(pid.as_u32()));
        }

        Err(KillError::CommandFailed(format!(
            "taskkill /PID {} failed: {}",
            pid,
            stderr.trim()
        )))
    }
}

impl Default for WindowsTreeKiller {
    fn default() -> Self {
        Self::new()
    }
}
