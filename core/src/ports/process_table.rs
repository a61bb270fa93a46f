//! Process table port (interface).

use crate::domain::ProcessSnapshot;
use crate::error::Result;

/// Port for enumerating live processes.
///
/// Implementations handle platform-specific details (`ps`, `tasklist`, etc.)
pub trait ProcessTablePort: Send + Sync {
    /// Capture the set of currently live pids.
    ///
    /// Zombies are reported as not alive: they cannot be signalled any further.
    fn snapshot(&self) -> impl std::future::Future<Output = Result<ProcessSnapshot>> + Send;
}
