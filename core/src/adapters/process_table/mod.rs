//! Process table adapters.
//!
//! Platform-specific enumeration of live processes.

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

use crate::domain::ProcessSnapshot;
use crate::error::Result;
use crate::ports::ProcessTablePort;

/// The main process table that uses platform-specific implementations.
pub struct ProcessTable {
    #[cfg(unix)]
    inner: unix::UnixProcessTable,

    #[cfg(windows)]
    inner: windows::WindowsProcessTable,
}

impl ProcessTable {
    /// Create a new process table for the current platform.
    pub fn new() -> Self {
        Self {
            #[cfg(unix)]
            inner: unix::UnixProcessTable::new(),

            #[cfg(windows)]
            inner: windows::WindowsProcessTable::new(),
        }
    }

    /// Capture all live processes.
    pub async fn snapshot(&self) -> Result<ProcessSnapshot> {
        self.inner.snapshot().await
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTablePort for ProcessTable {
    async fn snapshot(&self) -> Result<ProcessSnapshot> {
        self.inner.snapshot().await
    }
}
