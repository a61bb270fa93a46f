//! Concurrent, time-bounded kill execution.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::state::KillOrder;
use crate::domain::Pid;
use crate::error::KillError;
use crate::ports::ProcessKillerPort;

/// What happened to one kill attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    Signalled,
    /// The process was already gone, which is as good as killed.
    AlreadyGone,
    Failed(String),
    TimedOut,
}

/// Issues kill orders through a [`ProcessKillerPort`].
pub struct KillOrchestrator<K: ProcessKillerPort> {
    killer: Arc<K>,
    timeout: Duration,
}

impl<K: ProcessKillerPort + 'static> KillOrchestrator<K> {
    pub fn new(killer: K, timeout: Duration) -> Self {
        Self {
            killer: Arc::new(killer),
            timeout,
        }
    }

    /// Kill one process tree with the signal for `attempt`.
    pub async fn kill_tree(&self, pid: Pid, attempt: u32) -> KillOutcome {
        attempt_kill(&*self.killer, KillOrder { pid, attempt }, self.timeout).await
    }

    /// Run every order concurrently and wait until all of them settle.
    pub async fn execute(&self, orders: Vec<KillOrder>) -> Vec<(KillOrder, KillOutcome)> {
        let mut tasks = JoinSet::new();
        for order in orders {
            let killer = Arc::clone(&self.killer);
            let limit = self.timeout;
            tasks.spawn(async move {
                let outcome = attempt_kill(&*killer, order, limit).await;
                (order, outcome)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "Kill task failed"),
            }
        }
        results.sort_by_key(|(order, _)| order.pid);
        results
    }
}

async fn attempt_kill<K: ProcessKillerPort>(
    killer: &K,
    order: KillOrder,
    limit: Duration,
) -> KillOutcome {
    let signal = order.signal();
    debug!(pid = %order.pid, attempt = order.attempt, signal = %signal, "Killing process tree");

    match timeout(limit, killer.kill_tree(order.pid, signal)).await {
        Ok(Ok(())) => KillOutcome::Signalled,
        Ok(Err(KillError::ProcessNotFound(_))) => KillOutcome::AlreadyGone,
        Ok(Err(e)) => {
            warn!(pid = %order.pid, attempt = order.attempt, error = %e, "Kill attempt failed");
            KillOutcome::Failed(e.to_string())
        }
        Err(_) => {
            warn!(pid = %order.pid, attempt = order.attempt, "Kill attempt timed out");
            KillOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::KillSignal;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingKiller {
        calls: Mutex<Vec<(Pid, KillSignal)>>,
        missing: Vec<Pid>,
        hang: Vec<Pid>,
    }

    impl ProcessKillerPort for RecordingKiller {
        async fn kill_tree(&self, pid: Pid, signal: KillSignal) -> Result<(), KillError> {
            self.calls.lock().push((pid, signal));
            if self.hang.contains(&pid) {
                std::future::pending::<()>().await;
            }
            if self.missing.contains(&pid) {
                return Err(KillError::ProcessNotFound(pid.as_u32()));
            }
            Ok(())
        }
    }

    fn pid(raw: u32) -> Pid {
        Pid::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_execute_reports_every_outcome() {
        let killer = RecordingKiller {
            missing: vec![pid(20)],
            ..Default::default()
        };
        let orchestrator = KillOrchestrator::new(killer, Duration::from_secs(1));

        let results = orchestrator
            .execute(vec![
                KillOrder { pid: pid(20), attempt: 1 },
                KillOrder { pid: pid(10), attempt: 2 },
            ])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.pid, pid(10));
        assert_eq!(results[0].1, KillOutcome::Signalled);
        assert_eq!(results[1].1, KillOutcome::AlreadyGone);

        let mut calls = orchestrator.killer.calls.lock().clone();
        calls.sort_by_key(|(p, _)| *p);
        assert_eq!(
            calls,
            vec![(pid(10), KillSignal::Kill), (pid(20), KillSignal::Terminate)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_kill_times_out_without_blocking_others() {
        let killer = RecordingKiller {
            hang: vec![pid(30)],
            ..Default::default()
        };
        let orchestrator = KillOrchestrator::new(killer, Duration::from_secs(3));

        let results = orchestrator
            .execute(vec![
                KillOrder { pid: pid(30), attempt: 1 },
                KillOrder { pid: pid(31), attempt: 1 },
            ])
            .await;

        assert_eq!(results[0].1, KillOutcome::TimedOut);
        assert_eq!(results[1].1, KillOutcome::Signalled);
    }

    #[tokio::test]
    async fn test_single_kill() {
        let orchestrator = KillOrchestrator::new(RecordingKiller::default(), Duration::from_secs(1));
        assert_eq!(orchestrator.kill_tree(pid(5), 1).await, KillOutcome::Signalled);
    }
}
