//! Parent, child and kill commands - register into a running watchdog's channel.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use deadhand_core::{Ack, ChildOptions, Producer, Settings};
use serde::Serialize;

/// Options for `deadhand child`.
pub struct ChildRequest {
    pub pid: i64,
    pub ttl_ms: Option<u64>,
    pub name: Option<String>,
    pub highlander: bool,
}

pub async fn parent(
    channel: PathBuf,
    pid: i64,
    name: Option<String>,
    settings: Settings,
    json: bool,
) -> Result<()> {
    let producer = Producer::attach(channel, settings).await?;
    let ack = producer.add_parent(pid, name.as_deref())?;
    producer.flush().await?;
    report("parent", ack, json)
}

pub async fn child(
    channel: PathBuf,
    request: ChildRequest,
    settings: Settings,
    json: bool,
) -> Result<()> {
    let producer = Producer::attach(channel, settings).await?;

    let ack = match (&request.name, request.highlander) {
        (Some(name), true) => producer.highlander(request.pid, name)?,
        _ => {
            let mut options = ChildOptions::new(request.pid);
            if let Some(ms) = request.ttl_ms {
                options = options.ttl(Duration::from_millis(ms));
            }
            if let Some(name) = request.name {
                options = options.name(name);
            }
            producer.add_child(options)?
        }
    };

    producer.flush().await?;
    report("child", ack, json)
}

pub async fn kill(channel: PathBuf, name: Option<String>, settings: Settings, json: bool) -> Result<()> {
    let producer = Producer::attach(channel, settings).await?;
    let ack = producer.kill(name.as_deref())?;
    producer.flush().await?;
    report("kill", ack, json)
}

#[derive(Serialize)]
struct Receipt<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    ack: Ack,
}

fn report(kind: &str, ack: Ack, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&Receipt { kind, ack })?);
    } else {
        println!("Queued {} (ack {})", kind, ack);
    }
    Ok(())
}
