//! Process killer port (interface).

use crate::domain::{KillSignal, Pid};
use crate::error::KillError;

/// Port for killing process trees.
///
/// This trait defines the interface for process termination.
/// Implementations handle platform-specific signal handling.
pub trait ProcessKillerPort: Send + Sync {
    /// Send `signal` to `pid` and, where the platform allows, every descendant.
    ///
    /// Returns `Err(KillError::ProcessNotFound)` when the root pid is already gone.
    fn kill_tree(
        &self,
        pid: Pid,
        signal: KillSignal,
    ) -> impl std::future::Future<Output = Result<(), KillError>> + Send;
}
