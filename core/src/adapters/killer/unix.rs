//! Unix tree killer: walks the `ps` tree and signals each pid with nix.

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid as NixPid;
use tracing::{debug, warn};

use crate::adapters::process_table::ProcessTable;
use crate::domain::{KillSignal, Pid};
use crate::error::KillError;

pub struct UnixTreeKiller {
    table: ProcessTable,
}

impl UnixTreeKiller {
    pub fn new() -> Self {
        Self {
            table: ProcessTable::new(),
        }
    }

    /// Signal the root first, then every descendant found before signalling.
    ///
    /// The tree is captured up front: once the root dies its children are
    /// re-parented and can no longer be found through it.
    pub async fn kill_tree(&self, pid: Pid, signal: KillSignal) -> Result<(), KillError> {
        let descendants = match self.table.snapshot().await {
            Ok(snapshot) => snapshot.descendants(pid),
            Err(e) => {
                warn!(pid = %pid, error = %e, "Could not walk process tree, signalling root only");
                Vec::new()
            }
        };

        send_signal(pid, signal)?;

        for child in descendants {
            match send_signal(child, signal) {
                Ok(()) | Err(KillError::ProcessNotFound(_)) => {}
                Err(e) => warn!(pid = %child, root = %pid, error = %e, "Failed to signal descendant"),
            }
        }

        Ok(())
    }
}

impl Default for UnixTreeKiller {
    fn default() -> Self {
        Self::new()
    }
}

fn send_signal(pid: Pid, signal: KillSignal) -> Result<(), KillError> {
    let raw = i32::try_from(pid.as_u32())
        .map_err(|_| KillError::TerminationFailed(pid.as_u32(), "pid out of range".to_string()))?;
    let sig = match signal {
        KillSignal::Terminate => Signal::SIGTERM,
        KillSignal::Kill => Signal::SIGKILL,
    };

    debug!(pid = %pid, signal = %signal, "Sending signal to process");
    match signal::kill(NixPid::from_raw(raw), sig) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(KillError::ProcessNotFound(pid.as_u32())),
        Err(Errno::EPERM) => Err(KillError::PermissionDenied(pid.as_u32())),
        Err(errno) => Err(KillError::TerminationFailed(pid.as_u32(), errno.to_string())),
    }
}
