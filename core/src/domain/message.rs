//! Channel message domain model.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Pid;

/// Sequence number of a message within one producer's lifetime.
pub type Ack = u64;

/// What a channel message asks the watchdog to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Watch a pid; its death dooms children in its scope.
    Parent,
    /// Track a pid to be killed.
    Child,
    /// Doom children by name, or all children.
    Kill,
    /// Sent by a newer producer; acknowledged and ignored.
    #[serde(other)]
    Unknown,
}

/// One line of the channel file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<Pid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Producer wall-clock time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub date_ms: u64,

    pub ack: Ack,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,

    /// Writer of this message; acks are numbered per producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<Uuid>,
}

impl ChannelMessage {
    pub fn parent(pid: Pid, name: Option<String>, ack: Ack) -> Self {
        Self {
            kind: MessageKind::Parent,
            pid: Some(pid),
            name,
            date_ms: now_ms(),
            ack,
            ttl_ms: None,
            producer: None,
        }
    }

    pub fn child(pid: Pid, ttl_ms: Option<u64>, name: Option<String>, ack: Ack) -> Self {
        Self {
            kind: MessageKind::Child,
            pid: Some(pid),
            name,
            date_ms: now_ms(),
            ack,
            ttl_ms,
            producer: None,
        }
    }

    pub fn kill(name: Option<String>, ack: Ack) -> Self {
        Self {
            kind: MessageKind::Kill,
            pid: None,
            name,
            date_ms: now_ms(),
            ack,
            ttl_ms: None,
            producer: None,
        }
    }

    /// Tag the message with the producer that numbered it.
    pub fn from_producer(mut self, producer: Uuid) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Override the producer timestamp.
    pub fn at(mut self, date_ms: u64) -> Self {
        self.date_ms = date_ms;
        self
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: u32) -> Pid {
        Pid::new(raw).unwrap()
    }

    #[test]
    fn test_child_serializes_optional_fields_only_when_set() {
        let msg = ChannelMessage::child(pid(2000), None, None, 3).at(10);
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"child","pid":2000,"date_ms":10,"ack":3}"#
        );

        let msg = ChannelMessage::child(pid(2000), Some(5000), Some("whale".into()), 4).at(10);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""ttl_ms":5000"#));
        assert!(json.contains(r#""name":"whale""#));
    }

    #[test]
    fn test_kill_has_no_pid() {
        let json = serde_json::to_string(&ChannelMessage::kill(None, 9)).unwrap();
        assert!(!json.contains("pid"));
        assert!(json.contains(r#""type":"kill""#));
    }

    #[test]
    fn test_unknown_kind_still_decodes() {
        let msg: ChannelMessage =
            serde_json::from_str(r#"{"type":"highlander","ack":12,"pid":5}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown);
        assert_eq!(msg.ack, 12);
    }

    #[test]
    fn test_producer_id_round_trips() {
        let id = Uuid::new_v4();
        let msg = ChannelMessage::kill(None, 1).from_producer(id);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(&id.to_string()));
        assert_eq!(serde_json::from_str::<ChannelMessage>(&json).unwrap().producer, Some(id));
    }

    #[test]
    fn test_missing_ack_is_rejected() {
        assert!(serde_json::from_str::<ChannelMessage>(r#"{"type":"child","pid":5}"#).is_err());
    }
}
