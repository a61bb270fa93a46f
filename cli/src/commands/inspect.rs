//! Inspect command - decode a channel file.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use deadhand_core::channel::{self, ChannelContents};
use deadhand_core::{ChannelMessage, MessageKind};
use serde_json::json;

pub async fn run(path: &Path, json: bool) -> Result<()> {
    let contents = channel::read_all(path)
        .await
        .with_context(|| format!("Failed to read channel {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(&contents))?);
        return Ok(());
    }

    match &contents.header {
        Some(header) => println!(
            "Channel {} (pid {}, started {})",
            path.display(),
            header.pid,
            header.started.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("Channel {} (no header)", path.display()),
    }

    if contents.messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }

    // Table header
    println!(
        "{:<9} {:<6} {:<7} {:<8} {:<20} {:<9} TIME",
        "PRODUCER", "ACK", "TYPE", "PID", "NAME", "TTL"
    );
    println!("{}", "-".repeat(80));

    for message in &contents.messages {
        let pid = message
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let name = truncate(message.name.as_deref().unwrap_or("-"), 20);
        let ttl = message
            .ttl_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<9} {:<6} {:<7} {:<8} {:<20} {:<9} {}",
            short_producer(message),
            message.ack,
            kind_label(message),
            pid,
            name,
            ttl,
            format_time(message.date_ms)
        );
    }

    println!("\nTotal: {} messages, last ack {}", contents.messages.len(), contents.max_ack());
    Ok(())
}

fn to_json(contents: &ChannelContents) -> serde_json::Value {
    json!({
        "header": contents.header.as_ref().map(|h| json!({
            "pid": h.pid,
            "started": h.started.to_rfc3339(),
        })),
        "messages": contents.messages,
    })
}

fn short_producer(message: &ChannelMessage) -> String {
    message
        .producer
        .map(|id| id.simple().to_string().chars().take(8).collect())
        .unwrap_or_else(|| "-".to_string())
}

fn kind_label(message: &ChannelMessage) -> &'static str {
    match message.kind {
        MessageKind::Parent => "parent",
        MessageKind::Child => "child",
        MessageKind::Kill => "kill",
        MessageKind::Unknown => "?",
    }
}

fn format_time(date_ms: u64) -> String {
    i64::try_from(date_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .filter(|_| date_ms > 0)
        .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deadhand_core::Pid;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("whale", 20), "whale");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_format_time_without_timestamp() {
        assert_eq!(format_time(0), "-");
        assert_ne!(format_time(1_700_000_000_000), "-");
    }

    #[test]
    fn test_json_output_shape() {
        let contents = ChannelContents {
            header: None,
            messages: vec![ChannelMessage::kill(Some("whale".into()), 3).at(5)],
        };
        let value = to_json(&contents);
        assert!(value["header"].is_null());
        assert_eq!(value["messages"][0]["type"], "kill");
        assert_eq!(value["messages"][0]["ack"], 3);

        let child = ChannelMessage::child(Pid::new(7).unwrap(), None, None, 1);
        assert_eq!(kind_label(&child), "child");
        assert_eq!(short_producer(&child), "-");
    }

    #[test]
    fn test_producer_column_shows_id_prefix() {
        let raw = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let message = ChannelMessage::kill(None, 1).from_producer(raw.parse().unwrap());
        assert_eq!(short_producer(&message), "67e55044");
        assert_eq!(to_json(&ChannelContents {
            header: None,
            messages: vec![message],
        })["messages"][0]["producer"], raw);
    }
}
