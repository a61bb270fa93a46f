//! Time-to-live deadlines for children.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::Pid;

/// Pending TTL deadlines, at most one per pid.
#[derive(Debug, Default)]
pub struct TtlTimers {
    deadlines: HashMap<Pid, Instant>,
}

impl TtlTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline for `pid`, replacing any previous one.
    pub fn set(&mut self, pid: Pid, deadline: Instant) -> Option<Instant> {
        self.deadlines.insert(pid, deadline)
    }

    /// Drop the deadline for `pid` so a stale timer never fires on a reused pid.
    pub fn cancel(&mut self, pid: Pid) -> Option<Instant> {
        self.deadlines.remove(&pid)
    }

    pub fn deadline(&self, pid: Pid) -> Option<Instant> {
        self.deadlines.get(&pid).copied()
    }

    /// Remove and return every pid whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<Pid> {
        let mut expired: Vec<Pid> = self
            .deadlines
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .map(|(&pid, _)| pid)
            .collect();
        expired.sort();

        for pid in &expired {
            self.deadlines.remove(pid);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

/// Convert a producer-side registration time plus TTL into a local deadline.
///
/// Both timestamps are wall-clock milliseconds; a registration that is already
/// older than its TTL expires immediately. A missing producer timestamp (0)
/// counts from `now`.
pub fn deadline_from(now: Instant, now_ms: u64, date_ms: u64, ttl_ms: u64) -> Instant {
    let registered_ms = if date_ms == 0 { now_ms } else { date_ms };
    let remaining = registered_ms.saturating_add(ttl_ms).saturating_sub(now_ms);
    now + Duration::from_millis(remaining)
}
