//! File-backed message channel between producers and the watchdog.
//!
//! The channel is an append-only, ack-ordered log. Producers append batches of
//! newline-delimited JSON; the watchdog reads only what is new and applies
//! messages above its ack watermark, so replays and late starts are harmless.

mod codec;
mod file;
mod retry;

pub use codec::{decode, decode_line, encode, encode_batch, ChannelHeader, PROTOCOL};
pub use file::{read_all, ChannelContents, ChannelReader, ChannelWriter};
pub use retry::RetryPolicy;

use std::path::{Path, PathBuf};

/// Optional debug log written next to a channel file.
pub fn debug_log_path(channel: &Path) -> PathBuf {
    let mut name = channel.as_os_str().to_owned();
    name.push("-debug.log");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_log_path_is_sibling() {
        let log = debug_log_path(Path::new("/tmp/deadhand-1.channel"));
        assert_eq!(log, PathBuf::from("/tmp/deadhand-1.channel-debug.log"));
    }
}
