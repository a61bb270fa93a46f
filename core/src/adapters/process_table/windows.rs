//! Windows process table implementation using tasklist.

use std::process::Stdio;

use regex::Regex;
use tokio::process::Command;

use crate::domain::{Pid, ProcessSnapshot};
use crate::error::{Error, Result};

/// Windows-specific process table.
///
/// `tasklist` does not report parent pids; tree kills rely on `taskkill /T`.
pub struct WindowsProcessTable;

impl WindowsProcessTable {
    pub fn new() -> Self {
        Self
    }

    pub async fn snapshot(&self) -> Result<ProcessSnapshot> {
        let output = Command::new("tasklist")
            .args(["/FO", "CSV", "/NH"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::ProcessTable(format!("Failed to run tasklist: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tasklist_output(&stdout))
    }
}

impl Default for WindowsProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_tasklist_output(output: &str) -> ProcessSnapshot {
    let regex = Regex::new(r#"^"[^"]*","(\d+)""#).unwrap();
    ProcessSnapshot::from_pids(output.lines().filter_map(|line| {
        let caps = regex.captures(line.trim())?;
        caps[1].parse().ok().and_then(Pid::new)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tasklist_output() {
        let output = "\"System Idle Process\",\"0\",\"Services\",\"0\",\"8 K\"\r\n\"node.exe\",\"4242\",\"Console\",\"1\",\"30,000 K\"\r\n";
        let snap = parse_tasklist_output(output);
        assert_eq!(snap.len(), 1);
        assert!(snap.contains(Pid::new(4242).unwrap()));
    }
}
