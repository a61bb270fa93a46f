//! Registration inputs accepted by the producer API.

use std::time::Duration;

use super::Pid;
use crate::error::{Error, Result};

/// A child registration as callers hand it over: a bare pid or full options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Pid(i64),
    Options(ChildOptions),
}

/// Options for registering a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildOptions {
    pub pid: i64,
    pub ttl: Option<Duration>,
    pub name: Option<String>,
}

impl ChildOptions {
    pub fn new(pid: impl Into<i64>) -> Self {
        Self {
            pid: pid.into(),
            ttl: None,
            name: None,
        }
    }

    /// Doom the child once this much time has passed since registration.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Canonical, validated form of a child registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRegistration {
    pub pid: Pid,
    pub ttl: Option<Duration>,
    pub name: Option<String>,
}

impl Registration {
    pub fn normalize(self) -> Result<ChildRegistration> {
        match self {
            Registration::Pid(raw) => Ok(ChildRegistration {
                pid: Pid::from_i64("child", raw)?,
                ttl: None,
                name: None,
            }),
            Registration::Options(opts) => Ok(ChildRegistration {
                pid: Pid::from_i64("child", opts.pid)?,
                ttl: opts.ttl,
                name: normalize_name(opts.name)?,
            }),
        }
    }
}

impl From<u32> for Registration {
    fn from(pid: u32) -> Self {
        Registration::Pid(i64::from(pid))
    }
}

impl From<i32> for Registration {
    fn from(pid: i32) -> Self {
        Registration::Pid(i64::from(pid))
    }
}

impl From<i64> for Registration {
    fn from(pid: i64) -> Self {
        Registration::Pid(pid)
    }
}

impl From<Pid> for Registration {
    fn from(pid: Pid) -> Self {
        Registration::Pid(i64::from(pid.as_u32()))
    }
}

impl From<ChildOptions> for Registration {
    fn from(opts: ChildOptions) -> Self {
        Registration::Options(opts)
    }
}

/// Empty names mean "no name"; control characters are refused.
pub fn normalize_name(name: Option<String>) -> Result<Option<String>> {
    let Some(name) = name else {
        return Ok(None);
    };
    if name.is_empty() {
        return Ok(None);
    }
    if name.chars().any(char::is_control) {
        return Err(Error::InvalidName(name.escape_default().to_string()));
    }
    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_pid_normalizes() {
        let reg = Registration::from(1234u32).normalize().unwrap();
        assert_eq!(reg.pid.as_u32(), 1234);
        assert_eq!(reg.ttl, None);
        assert_eq!(reg.name, None);
    }

    #[test]
    fn test_options_normalize() {
        let reg = Registration::from(
            ChildOptions::new(42)
                .ttl(Duration::from_secs(3))
                .name("whale"),
        )
        .normalize()
        .unwrap();
        assert_eq!(reg.pid.as_u32(), 42);
        assert_eq!(reg.ttl, Some(Duration::from_secs(3)));
        assert_eq!(reg.name.as_deref(), Some("whale"));
    }

    #[test]
    fn test_invalid_pids_fail_fast() {
        assert!(Registration::from(0i64).normalize().is_err());
        assert!(Registration::from(-5i32).normalize().is_err());
        assert!(Registration::from(ChildOptions::new(-1)).normalize().is_err());
    }

    #[test]
    fn test_empty_name_is_none_and_control_chars_rejected() {
        assert_eq!(normalize_name(Some(String::new())).unwrap(), None);
        assert!(matches!(
            normalize_name(Some("a\nb".into())),
            Err(Error::InvalidName(_))
        ));
    }
}
