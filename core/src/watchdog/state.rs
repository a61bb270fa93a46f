//! Watchdog bookkeeping.
//!
//! Everything here is synchronous and takes the current instant explicitly,
//! so the lifecycle rules can be driven tick by tick in tests without a
//! runtime, a process table or a channel file.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ttl::{self, TtlTimers};
use crate::config::Settings;
use crate::domain::{
    ChannelMessage, ChildRecord, DoomReason, KillSignal, Liveness, MessageKind,
    ParentRecord, Pid, ProcessSnapshot, Watermarks,
};

/// Lifecycle phase of the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Watching parents and children, applying messages.
    Active,
    /// The main parent (or an unnamed parent) died: killing everything left.
    Draining { since: Instant },
    /// Nothing left to do; the process should clean up and exit.
    Terminated,
}

/// One kill to issue during the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillOrder {
    pub pid: Pid,
    /// 1-based attempt number for this child.
    pub attempt: u32,
}

impl KillOrder {
    pub fn signal(&self) -> KillSignal {
        KillSignal::for_attempt(self.attempt)
    }
}

/// Parents, children and timers owned by one watchdog.
#[derive(Debug)]
pub struct WatchdogState {
    phase: Phase,
    main_parent: Pid,
    parents: HashMap<Pid, ParentRecord>,
    children: HashMap<Pid, ChildRecord>,
    ttls: TtlTimers,
    watermarks: Watermarks,
    abandoned: BTreeSet<Pid>,
    grace_period: Duration,
    max_kill_attempts: u32,
}

impl WatchdogState {
    /// Start watching `main_parent`, which governs every child.
    pub fn new(main_parent: Pid, settings: &Settings, now: Instant) -> Self {
        let mut parents = HashMap::new();
        parents.insert(main_parent, ParentRecord::new(main_parent, None, now));

        Self {
            phase: Phase::Active,
            main_parent,
            parents,
            children: HashMap::new(),
            ttls: TtlTimers::new(),
            watermarks: Watermarks::new(),
            abandoned: BTreeSet::new(),
            grace_period: settings.grace_period(),
            max_kill_attempts: settings.max_kill_attempts,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    pub fn main_parent(&self) -> Pid {
        self.main_parent
    }

    /// Highest ack applied so far, per producer.
    pub fn watermarks(&self) -> &Watermarks {
        &self.watermarks
    }

    pub fn parent(&self, pid: Pid) -> Option<&ParentRecord> {
        self.parents.get(&pid)
    }

    pub fn child(&self, pid: Pid) -> Option<&ChildRecord> {
        self.children.get(&pid)
    }

    pub fn parents(&self) -> impl Iterator<Item = &ParentRecord> {
        self.parents.values()
    }

    pub fn children(&self) -> impl Iterator<Item = &ChildRecord> {
        self.children.values()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Children given up on after the attempt ceiling or the grace window.
    pub fn abandoned(&self) -> &BTreeSet<Pid> {
        &self.abandoned
    }

    /// Apply one message. Messages at or below their producer's watermark
    /// are ignored.
    ///
    /// `now_ms` is the wall clock used to translate the producer's timestamp
    /// into a TTL deadline. Returns whether the message was applied.
    pub fn apply(&mut self, message: &ChannelMessage, now: Instant, now_ms: u64) -> bool {
        if !self.watermarks.advance(message) {
            return false;
        }

        match message.kind {
            MessageKind::Parent => match message.pid {
                Some(pid) => self.add_parent(pid, message.name.clone(), now),
                None => warn!(ack = message.ack, "Parent message without pid"),
            },
            MessageKind::Child => match message.pid {
                Some(pid) => self.add_child(message, pid, now, now_ms),
                None => warn!(ack = message.ack, "Child message without pid"),
            },
            MessageKind::Kill => self.kill_by_name(message),
            MessageKind::Unknown => {
                debug!(ack = message.ack, "Skipping message of unknown type");
            }
        }
        true
    }

    /// Apply a batch in order; returns how many were applied.
    pub fn apply_all(&mut self, messages: &[ChannelMessage], now: Instant, now_ms: u64) -> usize {
        messages
            .iter()
            .filter(|m| self.apply(m, now, now_ms))
            .count()
    }

    fn add_parent(&mut self, pid: Pid, name: Option<String>, now: Instant) {
        // The main parent always governs everything.
        let name = if pid == self.main_parent { None } else { name };
        debug!(pid = %pid, name = ?name, "Watching parent");
        self.parents.insert(pid, ParentRecord::new(pid, name, now));
    }

    fn add_child(&mut self, message: &ChannelMessage, pid: Pid, now: Instant, now_ms: u64) {
        let mut record = ChildRecord::new(pid, message.name.clone(), message.ack, now);
        record.producer = message.producer;

        match message.ttl_ms {
            Some(ttl_ms) => {
                let deadline = ttl::deadline_from(now, now_ms, message.date_ms, ttl_ms);
                record.ttl_deadline = Some(deadline);
                self.ttls.set(pid, deadline);
            }
            None => {
                self.ttls.cancel(pid);
            }
        }

        if matches!(self.phase, Phase::Draining { .. } | Phase::Terminated) {
            record.doom(DoomReason::Draining);
        }

        debug!(pid = %pid, name = ?record.name, ttl_ms = ?message.ttl_ms, "Tracking child");
        self.children.insert(pid, record);
    }

    /// Doom children matching the kill's name that were registered before it.
    fn kill_by_name(&mut self, message: &ChannelMessage) {
        let name = message.name.as_deref();
        let ack = message.ack;
        let mut doomed = 0;
        for child in self.children.values_mut() {
            let matches = match name {
                None => true,
                Some(name) => child.name.as_deref() == Some(name),
            };
            if matches
                && child.precedes(message.producer, ack)
                && child.doom(DoomReason::KillRequested(ack)) {
                doomed += 1;
            }
        }
        info!(name = ?name, ack = ack, doomed = doomed, "Kill requested");
    }

    /// Run the liveness and lifecycle rules for one poll and return the kills
    /// to issue.
    ///
    /// `snapshot` is `None` when the process table could not be read; liveness
    /// is then left untouched for this tick while TTLs and kills still proceed.
    pub fn poll(&mut self, snapshot: Option<&ProcessSnapshot>, now: Instant) -> Vec<KillOrder> {
        if self.is_terminated() {
            return Vec::new();
        }

        let dead_parents = match snapshot {
            Some(snapshot) => self.reconcile(snapshot),
            None => Vec::new(),
        };
        self.expire_ttls(now);
        self.propagate_parent_deaths(&dead_parents, now);

        if self.settle(now) {
            return Vec::new();
        }
        self.plan_kills()
    }

    /// Update absence counters and drop confirmed-dead records.
    ///
    /// Returns the parents that were confirmed dead.
    fn reconcile(&mut self, snapshot: &ProcessSnapshot) -> Vec<ParentRecord> {
        let mut dead_parents = Vec::new();
        self.parents.retain(|&pid, parent| {
            match parent.observe(snapshot.contains(pid)) {
                Liveness::Dead => {
                    dead_parents.push(parent.clone());
                    false
                }
                _ => true,
            }
        });

        let mut dead_children = Vec::new();
        self.children.retain(|&pid, child| {
            match child.observe(snapshot.contains(pid)) {
                Liveness::Dead => {
                    dead_children.push((pid, child.doomed.clone()));
                    false
                }
                _ => true,
            }
        });

        for (pid, doomed) in dead_children {
            self.ttls.cancel(pid);
            match doomed {
                Some(reason) => info!(pid = %pid, reason = %reason, "Child gone"),
                None => debug!(pid = %pid, "Child exited on its own"),
            }
        }

        dead_parents.sort_by_key(|p| p.pid);
        dead_parents
    }

    fn expire_ttls(&mut self, now: Instant) {
        for pid in self.ttls.expire(now) {
            if let Some(child) = self.children.get_mut(&pid) {
                if child.doom(DoomReason::TtlExpired) {
                    info!(pid = %pid, "Child ttl expired");
                }
            }
        }
    }

    fn propagate_parent_deaths(&mut self, dead: &[ParentRecord], now: Instant) {
        for parent in dead {
            info!(pid = %parent.pid, name = ?parent.name, "Parent died");
            for child in self.children.values_mut() {
                if parent.governs(child) {
                    child.doom(DoomReason::ParentDied(parent.pid));
                }
            }

            if parent.name.is_none() && self.phase == Phase::Active {
                info!(pid = %parent.pid, grace_ms = self.grace_period.as_millis() as u64, "Draining");
                self.phase = Phase::Draining { since: now };
            }
        }
    }

    /// Move from draining to terminated once every child is gone or the grace
    /// window has elapsed. Returns whether the watchdog is terminated.
    fn settle(&mut self, now: Instant) -> bool {
        let Phase::Draining { since } = self.phase else {
            return self.is_terminated();
        };

        if !self.children.is_empty() && now.duration_since(since) < self.grace_period {
            return false;
        }

        let mut remaining: Vec<Pid> = self.children.keys().copied().collect();
        remaining.sort();
        for pid in remaining {
            warn!(pid = %pid, "Grace period elapsed, abandoning child");
            self.abandon(pid);
        }
        info!("All children handled, terminating");
        self.phase = Phase::Terminated;
        true
    }

    fn plan_kills(&mut self) -> Vec<KillOrder> {
        let mut doomed: Vec<Pid> = self
            .children
            .values()
            .filter(|c| c.is_doomed())
            .map(|c| c.pid)
            .collect();
        doomed.sort();

        let mut orders = Vec::with_capacity(doomed.len());
        for pid in doomed {
            let Some(child) = self.children.get_mut(&pid) else {
                continue;
            };
            if child.kill_attempts >= self.max_kill_attempts {
                warn!(pid = %pid, attempts = child.kill_attempts, "Giving up on child");
                self.abandon(pid);
                continue;
            }
            child.kill_attempts += 1;
            orders.push(KillOrder {
                pid,
                attempt: child.kill_attempts,
            });
        }
        orders
    }

    fn abandon(&mut self, pid: Pid) {
        self.children.remove(&pid);
        self.ttls.cancel(pid);
        self.abandoned.insert(pid);
    }
}
