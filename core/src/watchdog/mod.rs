//! The watchdog: a detached process that kills registered children when their
//! parents die.
//!
//! Two timers drive a single-owner loop. The read timer pulls new messages
//! from the channel; the poll timer runs a full tick (read, snapshot,
//! reconcile, doom, kill). Each timer is re-armed only after its work has
//! finished, so ticks never overlap.

mod orchestrator;
mod state;
mod ttl;

pub use orchestrator::{KillOrchestrator, KillOutcome};
pub use state::{KillOrder, Phase, WatchdogState};
pub use ttl::TtlTimers;

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::adapters::{ProcessTable, TreeKiller};
use crate::channel::{ChannelReader, ChannelWriter};
use crate::config::Settings;
use crate::domain::{now_ms, Pid};
use crate::error::{Error, Result};
use crate::ports::{ProcessKillerPort, ProcessTablePort};

/// How the watchdog finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Children that could not be killed.
    pub abandoned: Vec<Pid>,
    /// Whether the channel file was deleted.
    pub channel_removed: bool,
}

/// Watchdog loop over a process table and a killer.
pub struct Watchdog<T: ProcessTablePort, K: ProcessKillerPort> {
    state: WatchdogState,
    reader: ChannelReader,
    writer: ChannelWriter,
    table: T,
    orchestrator: KillOrchestrator<K>,
    settings: Settings,
    read_failing: bool,
}

impl Watchdog<ProcessTable, TreeKiller> {
    /// Watchdog backed by the real OS process table and signals.
    pub async fn start(main_parent: Pid, channel: PathBuf, settings: Settings) -> Result<Self> {
        Self::with_ports(
            main_parent,
            channel,
            settings,
            ProcessTable::new(),
            TreeKiller::new(),
        )
        .await
    }
}

impl<T: ProcessTablePort, K: ProcessKillerPort + 'static> Watchdog<T, K> {
    /// Build a watchdog with custom ports.
    ///
    /// Fails with [`Error::ChannelUnavailable`] when the channel's directory
    /// cannot be reached; a missing channel file is tolerated.
    pub async fn with_ports(
        main_parent: Pid,
        channel: PathBuf,
        settings: Settings,
        table: T,
        killer: K,
    ) -> Result<Self> {
        settings.validate()?;
        ensure_channel_dir(&channel).await?;

        let retry = settings.retry_policy();
        info!(
            main_parent = %main_parent,
            channel = %channel.display(),
            poll_ms = settings.poll_interval_ms,
            "Watchdog started"
        );

        Ok(Self {
            state: WatchdogState::new(main_parent, &settings, Instant::now()),
            reader: ChannelReader::new(channel.clone(), retry),
            writer: ChannelWriter::open(channel, retry),
            table,
            orchestrator: KillOrchestrator::new(killer, settings.kill_timeout()),
            settings,
            read_failing: false,
        })
    }

    pub fn state(&self) -> &WatchdogState {
        &self.state
    }

    pub fn channel_path(&self) -> &Path {
        self.reader.path()
    }

    /// Apply whatever is new in the channel. Returns the number of messages
    /// applied; read failures are logged and retried on the next read.
    pub async fn read_channel(&mut self) -> usize {
        match self.reader.read(self.state.watermarks()).await {
            Ok(messages) => {
                if self.read_failing {
                    info!("Channel readable again");
                    self.read_failing = false;
                }
                let applied = self
                    .state
                    .apply_all(&messages, Instant::now(), now_ms());
                if applied > 0 {
                    debug!(
                        applied = applied,
                        producers = self.state.watermarks().producers(),
                        "Applied messages"
                    );
                }
                applied
            }
            Err(e) => {
                if !self.read_failing {
                    warn!(error = %e, "Channel read failed, skipping");
                    self.read_failing = true;
                }
                0
            }
        }
    }

    /// One full poll: read, snapshot, reconcile, doom, kill.
    pub async fn tick(&mut self) -> Phase {
        self.read_channel().await;

        let snapshot = match self.table.snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "Process snapshot failed, skipping liveness check");
                None
            }
        };

        let orders = self.state.poll(snapshot.as_ref(), Instant::now());
        if !orders.is_empty() {
            for (order, outcome) in self.orchestrator.execute(orders).await {
                match outcome {
                    KillOutcome::Signalled => info!(
                        pid = %order.pid,
                        attempt = order.attempt,
                        signal = %order.signal(),
                        "Signalled child"
                    ),
                    KillOutcome::AlreadyGone => {
                        debug!(pid = %order.pid, "Child already gone")
                    }
                    // Logged by the orchestrator; the next tick retries.
                    KillOutcome::Failed(_) | KillOutcome::TimedOut => {}
                }
            }
        }

        self.state.phase()
    }

    /// Run until terminated, then clean up the channel.
    pub async fn run(mut self) -> Result<ExitReport> {
        let mut next_poll = Instant::now();
        let mut next_read = Instant::now() + self.settings.read_interval();

        loop {
            tokio::select! {
                _ = sleep_until(next_poll) => {
                    if self.tick().await == Phase::Terminated {
                        break;
                    }
                    next_poll = Instant::now() + self.settings.poll_interval();
                }
                _ = sleep_until(next_read) => {
                    self.read_channel().await;
                    next_read = Instant::now() + self.settings.read_interval();
                }
            }
        }

        self.finish().await
    }

    /// Delete the channel when nothing is left behind, otherwise leave it with
    /// a goodbye line for whoever investigates.
    async fn finish(self) -> Result<ExitReport> {
        let mut abandoned = self.state.abandoned().clone();
        abandoned.extend(self.state.children().map(|c| c.pid));
        let abandoned: Vec<Pid> = abandoned.into_iter().collect();

        let path = self.reader.path();
        let channel_removed = if abandoned.is_empty() {
            match fs::remove_file(path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed channel file");
                    true
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove channel file");
                    false
                }
            }
        } else {
            let pids: Vec<String> = abandoned.iter().map(Pid::to_string).collect();
            warn!(abandoned = %pids.join(","), "Leaving channel file for abandoned children");
            let goodbye = format!(
                "watchdog {} exiting, abandoned: {}",
                Pid::current(),
                pids.join(",")
            );
            if let Err(e) = self.writer.append_comment(&goodbye).await {
                warn!(error = %e, "Failed to write goodbye line");
            }
            false
        };

        info!(abandoned = abandoned.len(), "Watchdog exiting");
        Ok(ExitReport {
            abandoned,
            channel_removed,
        })
    }
}

async fn ensure_channel_dir(channel: &Path) -> Result<()> {
    let dir = match channel.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    match fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(Error::ChannelUnavailable(dir.to_path_buf())),
    }
}
