//! Channel file writer (producer side) and reader (watchdog side).

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use super::codec::{self, ChannelHeader};
use super::retry::RetryPolicy;
use crate::domain::{Ack, ChannelMessage, Watermarks};
use crate::error::{Error, Result};

fn channel_io(path: &Path, e: io::Error) -> Error {
    Error::ChannelIo {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Appends encoded messages to the channel file.
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    path: PathBuf,
    retry: RetryPolicy,
}

impl ChannelWriter {
    /// Create (or truncate) the channel file and write its header.
    pub async fn create(
        path: impl Into<PathBuf>,
        header: &ChannelHeader,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let path = path.into();
        let line = header.to_line();
        retry
            .run(|_| fs::write(&path, line.as_bytes()))
            .await
            .map_err(|e| channel_io(&path, e))?;

        debug!(path = %path.display(), "Created channel file");
        Ok(Self { path, retry })
    }

    /// Open an existing channel file for appending.
    pub fn open(path: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            path: path.into(),
            retry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a batch of messages as one write.
    ///
    /// A retry starts with a newline so the fragment of a failed partial write
    /// ends up on its own (undecodable) line instead of corrupting the batch.
    pub async fn append(&self, messages: &[ChannelMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let batch = codec::encode_batch(messages)?;
        self.append_raw(&batch).await?;
        debug!(count = messages.len(), path = %self.path.display(), "Flushed messages to channel");
        Ok(())
    }

    /// Append a `#` comment line.
    pub async fn append_comment(&self, text: &str) -> Result<()> {
        let line = format!("# {}\n", text.replace(['\r', '\n'], " "));
        self.append_raw(&line).await
    }

    async fn append_raw(&self, text: &str) -> Result<()> {
        let path = &self.path;
        self.retry
            .run(|attempt| async move {
                let mut file = OpenOptions::new().append(true).open(path).await?;
                if attempt > 0 {
                    file.write_all(b"\n").await?;
                }
                file.write_all(text.as_bytes()).await?;
                file.flush().await
            })
            .await
            .map_err(|e| channel_io(path, e))
    }
}

/// Incrementally reads new messages from the channel file.
///
/// Only complete lines are consumed; a trailing fragment without its newline
/// is left for the next read. If the file shrinks (it was replaced), reading
/// restarts from the top and the ack watermark filters out what was seen.
#[derive(Debug)]
pub struct ChannelReader {
    path: PathBuf,
    offset: u64,
    retry: RetryPolicy,
}

impl ChannelReader {
    pub fn new(path: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            retry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read messages appended since the last call that are above their
    /// producer's watermark.
    pub async fn read(&mut self, watermarks: &Watermarks) -> Result<Vec<ChannelMessage>> {
        let path = &self.path;
        let offset = self.offset;
        let (bytes, len) = self
            .retry
            .run(|_| async move {
                let mut file = fs::File::open(path).await?;
                let len = file.metadata().await?.len();
                let start = if len < offset { 0 } else { offset };
                file.seek(SeekFrom::Start(start)).await?;
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes).await?;
                Ok::<_, io::Error>((bytes, len))
            })
            .await
            .map_err(|e| channel_io(path, e))?;

        if len < self.offset {
            warn!(path = %self.path.display(), "Channel file shrank, rereading from start");
            self.offset = 0;
        }

        let Some(end) = bytes.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &bytes[..=end];
        self.offset += complete.len() as u64;

        let text = String::from_utf8_lossy(complete);
        Ok(codec::decode(&text, watermarks))
    }
}

/// Contents of a channel file read in one go.
#[derive(Debug, Clone)]
pub struct ChannelContents {
    pub header: Option<ChannelHeader>,
    pub messages: Vec<ChannelMessage>,
}

impl ChannelContents {
    /// Highest ack present, or 0 for an empty channel.
    pub fn max_ack(&self) -> Ack {
        self.messages.iter().map(|m| m.ack).max().unwrap_or(0)
    }
}

/// Read and decode a whole channel file.
pub async fn read_all(path: &Path) -> Result<ChannelContents> {
    let text = fs::read_to_string(path).await?;
    let header = text.lines().next().and_then(ChannelHeader::parse);
    Ok(ChannelContents {
        header,
        messages: codec::decode(&text, &Watermarks::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pid;

    fn pid(raw: u32) -> Pid {
        Pid::new(raw).unwrap()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(
            std::time::Duration::from_millis(5),
            std::time::Duration::from_millis(20),
        )
    }

    fn seen(ack: Ack) -> Watermarks {
        let mut marks = Watermarks::new();
        if ack > 0 {
            marks.advance(&ChannelMessage::kill(None, ack));
        }
        marks
    }

    #[tokio::test]
    async fn test_writer_and_reader_incremental() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.channel");
        let writer = ChannelWriter::create(&path, &ChannelHeader::new(pid(1)), fast_retry())
            .await
            .unwrap();
        let mut reader = ChannelReader::new(&path, fast_retry());

        assert!(reader.read(&seen(0)).await.unwrap().is_empty());

        writer
            .append(&[
                ChannelMessage::parent(pid(100), None, 1),
                ChannelMessage::child(pid(200), Some(5000), None, 2),
            ])
            .await
            .unwrap();

        let first = reader.read(&seen(0)).await.unwrap();
        assert_eq!(first.len(), 2);

        // Already consumed bytes are not read again
        assert!(reader.read(&seen(0)).await.unwrap().is_empty());

        writer
            .append(&[ChannelMessage::kill(Some("whale".into()), 3)])
            .await
            .unwrap();
        let second = reader.read(&seen(2)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].ack, 3);
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.channel");
        fs::write(&path, "{\"type\":\"child\",\"pid\":7,\"ack\":1}\n{\"type\":\"chi")
            .await
            .unwrap();

        let mut reader = ChannelReader::new(&path, fast_retry());
        assert_eq!(reader.read(&seen(0)).await.unwrap().len(), 1);

        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"ld\",\"pid\":8,\"ack\":2}\n").await.unwrap();

        let rest = reader.read(&seen(1)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].pid, Some(pid(8)));
    }

    #[tokio::test]
    async fn test_replaced_file_is_reread_with_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replaced.channel");
        let long = "{\"type\":\"child\",\"pid\":7,\"ack\":1}\n{\"type\":\"child\",\"pid\":8,\"ack\":2}\n";
        fs::write(&path, long).await.unwrap();

        let mut reader = ChannelReader::new(&path, fast_retry());
        assert_eq!(reader.read(&seen(0)).await.unwrap().len(), 2);

        fs::write(&path, "{\"type\":\"kill\",\"ack\":3}\n").await.unwrap();
        let after = reader.read(&seen(2)).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].ack, 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_channel_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = ChannelReader::new(dir.path().join("nope"), fast_retry());
        assert!(matches!(reader.read(&seen(0)).await, Err(Error::ChannelIo { .. })));
    }

    #[tokio::test]
    async fn test_read_all_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.channel");
        let writer = ChannelWriter::create(&path, &ChannelHeader::new(pid(9)), fast_retry())
            .await
            .unwrap();
        writer
            .append(&[ChannelMessage::child(pid(11), None, None, 4)])
            .await
            .unwrap();
        writer.append_comment("exiting\nnow").await.unwrap();

        let contents = read_all(&path).await.unwrap();
        assert_eq!(contents.header.as_ref().unwrap().pid, pid(9));
        assert_eq!(contents.max_ack(), 4);

        let text = fs::read_to_string(&path).await.unwrap();
        assert!(text.ends_with("# exiting now\n"));
    }
}
