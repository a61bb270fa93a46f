//! Line codec for the channel file.
//!
//! The file starts with a `#` header line naming the protocol, the owning pid
//! and the start time. Every other line is one JSON message. Lines that are
//! blank, start with `#`, or fail to decode are skipped.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ChannelMessage, Pid, Watermarks};
use crate::error::Result;

/// Protocol tag written into every channel header.
pub const PROTOCOL: &str = "deadhand-channel/1";

/// First line of a channel file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHeader {
    pub pid: Pid,
    pub started: DateTime<Utc>,
}

impl ChannelHeader {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            started: Utc::now(),
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "# {} pid={} started={}\n",
            PROTOCOL,
            self.pid,
            self.started.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }

    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix('#')?.trim_start();
        let rest = rest.strip_prefix(PROTOCOL)?;

        let mut pid = None;
        let mut started = None;
        for field in rest.split_whitespace() {
            if let Some(value) = field.strip_prefix("pid=") {
                pid = value.parse().ok().and_then(Pid::new);
            } else if let Some(value) = field.strip_prefix("started=") {
                started = DateTime::parse_from_rfc3339(value)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc));
            }
        }

        Some(Self {
            pid: pid?,
            started: started?,
        })
    }
}

/// Serialize one message as a newline-terminated line.
pub fn encode(message: &ChannelMessage) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Serialize a batch of messages.
pub fn encode_batch(messages: &[ChannelMessage]) -> Result<String> {
    messages.iter().map(encode).collect()
}

/// Decode one line, or `None` for comments, blanks and malformed input.
pub fn decode_line(line: &str) -> Option<ChannelMessage> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!(error = %e, line = line, "Dropping malformed channel line");
            None
        }
    }
}

/// Decode every message above its producer's watermark.
///
/// Each producer's messages come out in ack order, interleaved with other
/// producers the way they appear in the file. Duplicate acks keep their
/// first occurrence.
pub fn decode(text: &str, watermarks: &Watermarks) -> Vec<ChannelMessage> {
    let mut slots: Vec<Option<Uuid>> = Vec::new();
    let mut lanes: HashMap<Option<Uuid>, Vec<ChannelMessage>> = HashMap::new();
    for message in text
        .lines()
        .filter_map(decode_line)
        .filter(|m| watermarks.admits(m))
    {
        slots.push(message.producer);
        lanes.entry(message.producer).or_default().push(message);
    }

    // Descending so pop() yields the lowest ack
    for lane in lanes.values_mut() {
        lane.sort_by_key(|m| Reverse(m.ack));
        lane.dedup_by_key(|m| m.ack);
    }

    slots
        .into_iter()
        .filter_map(|producer| lanes.get_mut(&producer).and_then(Vec::pop))
        .collect()
}
