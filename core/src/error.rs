//! Error types for the deadhand-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for deadhand operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while registering processes or running the watchdog.
#[derive(Error, Debug)]
pub enum Error {
    /// A pid was non-numeric, zero or negative.
    #[error("Invalid {role} pid: {value}")]
    InvalidPid { role: &'static str, value: String },

    /// A group name cannot be written to the channel.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Channel file I/O kept failing for the whole retry window.
    #[error("Channel I/O failed for {path}: {reason}")]
    ChannelIo { path: PathBuf, reason: String },

    /// The channel's directory cannot be reached at all.
    #[error("Channel directory unavailable: {0}")]
    ChannelUnavailable(PathBuf),

    /// Failed to start the watchdog process.
    #[error("Failed to spawn watchdog: {0}")]
    Spawn(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to enumerate live processes.
    #[error("Process table unavailable: {0}")]
    ProcessTable(String),

    /// The producer's flusher is gone; nothing more can be queued.
    #[error("Producer is closed")]
    ProducerClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Signal delivery error.
    #[error(transparent)]
    Kill(#[from] KillError),
}

/// Errors that can occur while delivering a kill signal.
#[derive(Debug, Error)]
pub enum KillError {
    /// The specified process was not found
    #[error("Process with PID {0} not found")]
    ProcessNotFound(u32),

    /// Permission denied to kill the process
    #[error("Permission denied to kill process {0}")]
    PermissionDenied(u32),

    /// Failed to execute the kill command
    #[error("Failed to execute kill command: {0}")]
    CommandFailed(String),

    /// The process could not be terminated
    #[error("Failed to terminate process {0}: {1}")]
    TerminationFailed(u32, String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_error_display() {
        let err = KillError::ProcessNotFound(1234);
        assert!(err.to_string().contains("1234"));

        let err = KillError::PermissionDenied(5678);
        assert!(err.to_string().contains("5678"));

        let err = KillError::CommandFailed("test error".to_string());
        assert!(err.to_string().contains("test error"));
    }

    #[test]
    fn test_invalid_pid_display() {
        let err = Error::InvalidPid {
            role: "child",
            value: "-3".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid child pid: -3");
    }
}
