//! Process tree killer adapters.

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

use crate::domain::{KillSignal, Pid};
use crate::error::KillError;
use crate::ports::ProcessKillerPort;

/// Kills a process and its descendants using platform-specific mechanisms.
pub struct TreeKiller {
    #[cfg(unix)]
    inner: unix::UnixTreeKiller,

    #[cfg(windows)]
    inner: windows::WindowsTreeKiller,
}

impl TreeKiller {
    pub fn new() -> Self {
        Self {
            #[cfg(unix)]
            inner: unix::UnixTreeKiller::new(),

            #[cfg(windows)]
            inner: windows::WindowsTreeKiller::new(),
        }
    }
}

impl Default for TreeKiller {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessKillerPort for TreeKiller {
    async fn kill_tree(&self, pid: Pid, signal: KillSignal) -> Result<(), KillError> {
        self.inner.kill_tree(pid, signal).await
    }
}
