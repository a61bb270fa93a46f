//! Process id and kill signal domain models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A positive OS process id.
///
/// Zero and negative values are rejected at every boundary: on the wire a
/// message carrying `pid: 0` fails to decode and is dropped like any other
/// malformed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Pid(u32);

impl Pid {
    /// Wrap a raw pid, refusing zero.
    pub fn new(raw: u32) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    /// The pid of the calling process.
    pub fn current() -> Self {
        Self(std::process::id())
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Validate a signed pid coming from a caller.
    pub fn from_i64(role: &'static str, raw: i64) -> Result<Self> {
        u32::try_from(raw)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| Error::InvalidPid {
                role,
                value: raw.to_string(),
            })
    }

    /// Parse a pid from text, e.g. a command-line argument.
    pub fn parse(role: &'static str, text: &str) -> Result<Self> {
        let raw: i64 = text.trim().parse().map_err(|_| Error::InvalidPid {
            role,
            value: text.to_string(),
        })?;
        Self::from_i64(role, raw)
    }
}

impl TryFrom<u64> for Pid {
    type Error = String;

    fn try_from(raw: u64) -> std::result::Result<Self, Self::Error> {
        u32::try_from(raw)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| format!("pid out of range: {raw}"))
    }
}

impl From<Pid> for u64 {
    fn from(pid: Pid) -> Self {
        u64::from(pid.0)
    }
}

impl FromStr for Pid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse("process", s)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signal used for one kill attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KillSignal {
    /// Graceful termination request (SIGTERM).
    Terminate,
    /// Immediate forced termination (SIGKILL).
    Kill,
}

impl KillSignal {
    /// Escalation policy: the first attempt asks nicely, every later one forces.
    pub fn for_attempt(attempt: u32) -> Self {
        if attempt <= 1 {
            KillSignal::Terminate
        } else {
            KillSignal::Kill
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KillSignal::Terminate => "SIGTERM",
            KillSignal::Kill => "SIGKILL",
        }
    }
}

impl fmt::Display for KillSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
