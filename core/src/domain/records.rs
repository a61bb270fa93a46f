//! Parent and child records tracked by the watchdog.

use std::fmt;

use tokio::time::Instant;
use uuid::Uuid;

use super::{Ack, Pid};

/// Consecutive absent polls before a pid counts as dead.
///
/// One poll is not enough: a pid registered after the snapshot of the same
/// tick was taken would look dead on its very first poll.
pub const CONFIRM_DEAD_POLLS: u32 = 2;

/// Result of matching a record against one liveness snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    /// Absent, but not yet for long enough to be trusted.
    Missing,
    Dead,
}

/// Why a child was marked for killing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoomReason {
    /// A governing parent died.
    ParentDied(Pid),
    /// The child's time-to-live elapsed.
    TtlExpired,
    /// A `kill` message with this ack matched the child.
    KillRequested(Ack),
    /// Registered while the watchdog was already draining.
    Draining,
}

impl fmt::Display for DoomReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoomReason::ParentDied(pid) => write!(f, "parent {pid} died"),
            DoomReason::TtlExpired => f.write_str("ttl expired"),
            DoomReason::KillRequested(ack) => write!(f, "kill requested (ack {ack})"),
            DoomReason::Draining => f.write_str("watchdog draining"),
        }
    }
}

/// A process whose death dooms children in its scope.
#[derive(Debug, Clone)]
pub struct ParentRecord {
    pub pid: Pid,
    /// `None` governs every child; `Some` only children of the same name.
    pub name: Option<String>,
    pub registered_at: Instant,
    pub absent_polls: u32,
}

impl ParentRecord {
    pub fn new(pid: Pid, name: Option<String>, registered_at: Instant) -> Self {
        Self {
            pid,
            name,
            registered_at,
            absent_polls: 0,
        }
    }

    pub fn observe(&mut self, present: bool) -> Liveness {
        observe(&mut self.absent_polls, present)
    }

    /// Whether this parent's death dooms `child`.
    pub fn governs(&self, child: &ChildRecord) -> bool {
        match &self.name {
            None => true,
            Some(name) => child.name.as_deref() == Some(name.as_str()),
        }
    }
}

/// A process to kill when its scope is doomed.
#[derive(Debug, Clone)]
pub struct ChildRecord {
    pub pid: Pid,
    pub name: Option<String>,
    pub registered_at: Instant,
    /// Ack of the message that created or last replaced this record.
    pub ack: Ack,
    /// Producer that numbered `ack`.
    pub producer: Option<Uuid>,
    pub ttl_deadline: Option<Instant>,
    pub kill_attempts: u32,
    pub doomed: Option<DoomReason>,
    pub absent_polls: u32,
}

impl ChildRecord {
    pub fn new(pid: Pid, name: Option<String>, ack: Ack, registered_at: Instant) -> Self {
        Self {
            pid,
            name,
            registered_at,
            ack,
            producer: None,
            ttl_deadline: None,
            kill_attempts: 0,
            doomed: None,
            absent_polls: 0,
        }
    }

    pub fn observe(&mut self, present: bool) -> Liveness {
        observe(&mut self.absent_polls, present)
    }

    /// Whether this record predates a kill numbered `ack` by `producer`.
    ///
    /// Acks only order messages from the same producer. A record from
    /// another producer was applied before the kill, so it is in scope.
    pub fn precedes(&self, producer: Option<Uuid>, ack: Ack) -> bool {
        self.producer != producer || self.ack <= ack
    }

    pub fn is_doomed(&self) -> bool {
        self.doomed.is_some()
    }

    /// Mark for killing. Returns false when already doomed; the first reason wins.
    pub fn doom(&mut self, reason: DoomReason) -> bool {
        if self.doomed.is_some() {
            return false;
        }
        self.doomed = Some(reason);
        true
    }
}

fn observe(absent_polls: &mut u32, present: bool) -> Liveness {
    if present {
        *absent_polls = 0;
        return Liveness::Alive;
    }

    *absent_polls += 1;
    if *absent_polls >= CONFIRM_DEAD_POLLS {
        Liveness::Dead
    } else {
        Liveness::Missing
    }
}
