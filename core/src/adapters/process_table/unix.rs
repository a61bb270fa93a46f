//! Unix process table implementation using ps.

use std::process::Stdio;

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::domain::{Pid, ProcessSnapshot};
use crate::error::{Error, Result};

/// Unix-specific process table (Linux and macOS `ps` agree on these columns).
pub struct UnixProcessTable;

impl UnixProcessTable {
    pub fn new() -> Self {
        Self
    }

    pub async fn snapshot(&self) -> Result<ProcessSnapshot> {
        let output = Command::new("ps")
            .args(["-A", "-o", "pid=", "-o", "ppid=", "-o", "stat="])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::ProcessTable(format!("Failed to run ps: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ProcessTable(format!(
                "ps exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| Error::ProcessTable(format!("Invalid UTF-8 in ps output: {}", e)))?;

        let snapshot = parse_ps_output(&stdout);
        debug!(processes = snapshot.len(), "Captured process table");
        Ok(snapshot)
    }
}

impl Default for UnixProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_ps_output(output: &str) -> ProcessSnapshot {
    let regex = Regex::new(r"^\s*(\d+)\s+(\d+)\s+(\S+)").unwrap();
    let mut snapshot = ProcessSnapshot::new();

    for line in output.lines() {
        let Some(caps) = regex.captures(line) else {
            continue;
        };

        // Zombies are already dead; only their parent can reap them.
        if caps[3].starts_with('Z') {
            continue;
        }

        let Some(pid) = caps[1].parse().ok().and_then(Pid::new) else {
            continue;
        };
        let ppid = caps[2].parse().ok().and_then(Pid::new);
        snapshot.insert(pid, ppid);
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: u32) -> Pid {
        Pid::new(raw).unwrap()
    }

    #[test]
    fn test_parse_ps_output() {
        let output = "    1     0 Ss\n  200     1 S\n  201   200 R+\n  202   200 Z\ngarbage\n";
        let snap = parse_ps_output(output);
        assert!(snap.contains(pid(1)));
        assert!(snap.contains(pid(201)));
        assert!(!snap.contains(pid(202)), "zombies are not alive");
        assert_eq!(snap.descendants(pid(200)), vec![pid(201)]);
    }

    #[tokio::test]
    async fn test_snapshot_contains_current_process() {
        let table = UnixProcessTable::new();
        let snap = table.snapshot().await.unwrap();
        assert!(snap.contains(Pid::current()));
    }
}
