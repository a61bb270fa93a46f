//! Watch command - run the watchdog until its work is done.

use std::path::PathBuf;

use anyhow::Result;
use deadhand_core::{Pid, Settings, Watchdog};
use tracing::warn;

pub async fn run(parent: Pid, channel: PathBuf, settings: Settings) -> Result<()> {
    let watchdog = Watchdog::start(parent, channel, settings).await?;
    let report = watchdog.run().await?;

    if !report.abandoned.is_empty() {
        let pids: Vec<String> = report.abandoned.iter().map(|p| p.to_string()).collect();
        warn!(abandoned = %pids.join(","), "Exited with abandoned children");
    }
    Ok(())
}
