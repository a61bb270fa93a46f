//! Producer side: register parents and children with a watchdog.
//!
//! Every call turns into one ack-numbered [`ChannelMessage`]. Messages are
//! queued in memory and a background flusher appends them to the channel file
//! in batches. Acks are assigned and queued under one lock, so the file always
//! sees them in order even when a [`Producer`] is shared between tasks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{self, ChannelHeader, ChannelWriter};
use crate::config::Settings;
use crate::domain::{normalize_name, Ack, ChannelMessage, Pid, Registration};
use crate::error::{Error, Result};

/// Work for the flusher task.
enum Queued {
    Append(ChannelMessage),
    Flush(oneshot::Sender<Result<()>>),
}

struct Shared {
    id: Uuid,
    channel: PathBuf,
    next_ack: Mutex<Ack>,
    queue: mpsc::UnboundedSender<Queued>,
    watchdog_pid: Option<Pid>,
}

/// Handle for sending registrations to one watchdog. Cheap to clone.
#[derive(Clone)]
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Create a fresh channel in the temp directory and spawn a detached
    /// watchdog that watches the current process.
    pub async fn launch(settings: Settings) -> Result<Self> {
        let path = std::env::temp_dir().join(format!("deadhand-{}.channel", Uuid::new_v4()));
        Self::launch_at(path, settings).await
    }

    /// Like [`Producer::launch`], with an explicit channel path.
    pub async fn launch_at(path: impl Into<PathBuf>, settings: Settings) -> Result<Self> {
        let path = path.into();
        let me = Pid::current();
        let writer =
            ChannelWriter::create(&path, &ChannelHeader::new(me), settings.retry_policy()).await?;
        let watchdog_pid = spawn_watchdog(&path, me, &settings)?;

        info!(
            channel = %path.display(),
            watchdog_pid = %watchdog_pid,
            "Launched watchdog"
        );
        Ok(Self::start(writer, 1, Some(watchdog_pid), &settings))
    }

    /// Create a channel without spawning a watchdog.
    pub async fn create(path: impl Into<PathBuf>, settings: Settings) -> Result<Self> {
        let path = path.into();
        let writer = ChannelWriter::create(
            &path,
            &ChannelHeader::new(Pid::current()),
            settings.retry_policy(),
        )
        .await?;
        Ok(Self::start(writer, 1, None, &settings))
    }

    /// Continue an existing channel, numbering after its highest ack.
    ///
    /// The attached producer gets its own id, so its acks never shadow
    /// messages still queued by the producer that owns the channel.
    pub async fn attach(path: impl Into<PathBuf>, settings: Settings) -> Result<Self> {
        let path = path.into();
        let contents = channel::read_all(&path).await.map_err(|e| Error::ChannelIo {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let next_ack = contents.max_ack() + 1;
        debug!(channel = %path.display(), next_ack = next_ack, "Attached to channel");

        let writer = ChannelWriter::open(path, settings.retry_policy());
        Ok(Self::start(writer, next_ack, None, &settings))
    }

    fn start(
        writer: ChannelWriter,
        next_ack: Ack,
        watchdog_pid: Option<Pid>,
        settings: &Settings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = writer.path().to_path_buf();
        tokio::spawn(run_flusher(writer, rx, settings.flush_retry_delay()));

        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                channel,
                next_ack: Mutex::new(next_ack),
                queue: tx,
                watchdog_pid,
            }),
        }
    }

    pub fn channel_path(&self) -> &Path {
        &self.shared.channel
    }

    /// Id stamped on every message; the watchdog orders acks per id.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Pid of the watchdog this producer spawned, if it spawned one.
    pub fn watchdog_pid(&self) -> Option<Pid> {
        self.shared.watchdog_pid
    }

    /// Watch `pid`; when it dies, children in its scope are killed.
    ///
    /// Without a name the parent governs every child.
    pub fn add_parent(&self, pid: impl Into<i64>, name: Option<&str>) -> Result<Ack> {
        let pid = Pid::from_i64("parent", pid.into())?;
        let name = normalize_name(name.map(str::to_string))?;
        self.send(|ack| ChannelMessage::parent(pid, name, ack))
    }

    /// Register a child: a bare pid or [`ChildOptions`](crate::ChildOptions).
    pub fn add_child(&self, registration: impl Into<Registration>) -> Result<Ack> {
        let child = registration.into().normalize()?;
        let ttl_ms = child.ttl.map(duration_ms);
        self.send(|ack| ChannelMessage::child(child.pid, ttl_ms, child.name, ack))
    }

    /// Kill children by name, or every child.
    pub fn kill(&self, name: Option<&str>) -> Result<Ack> {
        let name = normalize_name(name.map(str::to_string))?;
        self.send(|ack| ChannelMessage::kill(name, ack))
    }

    /// Keep at most one child under `name`: earlier children of that name are
    /// killed, `pid` is registered in their place.
    pub fn highlander(&self, pid: impl Into<i64>, name: &str) -> Result<Ack> {
        let pid = Pid::from_i64("child", pid.into())?;
        let name = normalize_name(Some(name.to_string()))?
            .ok_or_else(|| Error::InvalidName("highlander requires a name".to_string()))?;

        let mut next = self.shared.next_ack.lock();
        let kill = ChannelMessage::kill(Some(name.clone()), *next);
        let child = ChannelMessage::child(pid, None, Some(name), *next + 1);
        self.enqueue(kill)?;
        self.enqueue(child)?;
        *next += 2;
        Ok(*next - 1)
    }

    /// Scope registrations under a name.
    pub fn namespace(&self, name: &str) -> Result<Namespace> {
        Namespace::new(self.clone(), name)
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .queue
            .send(Queued::Flush(tx))
            .map_err(|_| Error::ProducerClosed)?;
        rx.await.map_err(|_| Error::ProducerClosed)?
    }

    fn send(&self, build: impl FnOnce(Ack) -> ChannelMessage) -> Result<Ack> {
        let mut next = self.shared.next_ack.lock();
        let ack = *next;
        self.enqueue(build(ack))?;
        *next += 1;
        Ok(ack)
    }

    fn enqueue(&self, message: ChannelMessage) -> Result<()> {
        self.shared
            .queue
            .send(Queued::Append(message.from_producer(self.shared.id)))
            .map_err(|_| Error::ProducerClosed)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Registrations scoped to one name on a shared producer.
#[derive(Clone)]
pub struct Namespace {
    producer: Producer,
    name: String,
}

impl Namespace {
    fn new(producer: Producer, name: &str) -> Result<Self> {
        let name = normalize_name(Some(name.to_string()))?
            .ok_or_else(|| Error::InvalidName("namespace requires a name".to_string()))?;
        Ok(Self { producer, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A nested namespace, `outer/inner`.
    pub fn namespace(&self, name: &str) -> Result<Namespace> {
        Namespace::new(self.producer.clone(), &format!("{}/{}", self.name, name))
    }

    /// Parent whose death kills only this namespace's children.
    pub fn add_parent(&self, pid: impl Into<i64>) -> Result<Ack> {
        self.producer.add_parent(pid, Some(&self.name))
    }

    /// Register a child under this namespace; any name on the registration is
    /// replaced.
    pub fn add_child(&self, registration: impl Into<Registration>) -> Result<Ack> {
        let mut child = registration.into().normalize()?;
        child.name = Some(self.name.clone());
        let ttl_ms = child.ttl.map(duration_ms);
        self.producer
            .send(|ack| ChannelMessage::child(child.pid, ttl_ms, child.name, ack))
    }

    pub fn kill(&self) -> Result<Ack> {
        self.producer.kill(Some(&self.name))
    }

    pub fn highlander(&self, pid: impl Into<i64>) -> Result<Ack> {
        self.producer.highlander(pid, &self.name)
    }

    pub async fn flush(&self) -> Result<()> {
        self.producer.flush().await
    }
}

/// Producers keyed by an application-chosen key, so one application spawns
/// one watchdog per key rather than one per call site.
#[derive(Default)]
pub struct ProducerRegistry {
    producers: tokio::sync::Mutex<HashMap<String, Producer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the producer for `key`, launching a watchdog on first use.
    pub async fn get_or_launch(&self, key: &str, settings: &Settings) -> Result<Producer> {
        let settings = settings.clone();
        self.get_or_insert_with(key, || Producer::launch(settings))
            .await
    }

    /// Return the producer for `key`, building it with `init` on first use.
    ///
    /// A failed `init` leaves the key empty so the next call tries again.
    pub async fn get_or_insert_with<F, Fut>(&self, key: &str, init: F) -> Result<Producer>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Producer>>,
    {
        let mut producers = self.producers.lock().await;
        if let Some(producer) = producers.get(key) {
            return Ok(producer.clone());
        }

        let producer = init().await?;
        producers.insert(key.to_string(), producer.clone());
        Ok(producer)
    }

    pub async fn get(&self, key: &str) -> Option<Producer> {
        self.producers.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.producers.lock().await.len()
    }
}

/// Flush queued messages in batches until every producer handle is dropped.
async fn run_flusher(
    writer: ChannelWriter,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    retry_delay: Duration,
) {
    let mut pending: Vec<ChannelMessage> = Vec::new();
    let mut waiters: Vec<oneshot::Sender<Result<()>>> = Vec::new();
    let mut open = true;

    loop {
        if pending.is_empty() && waiters.is_empty() {
            if !open {
                break;
            }
            match rx.recv().await {
                Some(command) => collect(command, &mut pending, &mut waiters),
                None => break,
            }
        }

        while open {
            match rx.try_recv() {
                Ok(command) => collect(command, &mut pending, &mut waiters),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => open = false,
            }
        }

        match writer.append(&pending).await {
            Ok(()) => {
                pending.clear();
                for waiter in waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    pending = pending.len(),
                    "Channel write failed, will retry"
                );
                for waiter in waiters.drain(..) {
                    let _ = waiter.send(Err(Error::ChannelIo {
                        path: writer.path().to_path_buf(),
                        reason: e.to_string(),
                    }));
                }
                if !open {
                    warn!(dropped = pending.len(), "Producer closed, dropping unwritten messages");
                    break;
                }
                sleep(retry_delay).await;
            }
        }
    }

    debug!(channel = %writer.path().display(), "Flusher stopped");
}

fn collect(
    command: Queued,
    pending: &mut Vec<ChannelMessage>,
    waiters: &mut Vec<oneshot::Sender<Result<()>>>,
) {
    match command {
        Queued::Append(message) => pending.push(message),
        Queued::Flush(waiter) => waiters.push(waiter),
    }
}

/// Path of the watchdog executable.
fn watchdog_bin(settings: &Settings) -> Result<PathBuf> {
    if let Some(bin) = &settings.watchdog_bin {
        return Ok(bin.clone());
    }
    let exe = std::env::current_exe()
        .map_err(|e| Error::Spawn(format!("Could not locate current executable: {}", e)))?;
    let name = if cfg!(windows) { "deadhand.exe" } else { "deadhand" };
    exe.parent()
        .map(|dir| dir.join(name))
        .ok_or_else(|| Error::Spawn("Current executable has no parent directory".to_string()))
}

fn spawn_watchdog(path: &Path, parent: Pid, settings: &Settings) -> Result<Pid> {
    let bin = watchdog_bin(settings)?;
    let settings_json = serde_json::to_string(settings)?;

    let mut cmd = Command::new(&bin);
    cmd.arg("watch")
        .arg("--parent")
        .arg(parent.to_string())
        .arg("--channel")
        .arg(path)
        .arg("--settings")
        .arg(settings_json)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    if settings.debug {
        cmd.arg("--log-file").arg(channel::debug_log_path(path));
    }

    // Outlive the parent: own process group, no console, no terminal signals.
    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    {
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Spawn(format!("{}: {}", bin.display(), e)))?;
    let pid = child
        .id()
        .and_then(Pid::new)
        .ok_or_else(|| Error::Spawn("Watchdog exited immediately".to_string()))?;

    // Reap the watchdog if it exits while we are still running.
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!(pid = %pid, status = %status, "Watchdog exited"),
            Err(e) => debug!(pid = %pid, error = %e, "Lost track of watchdog"),
        }
    });

    Ok(pid)
}
