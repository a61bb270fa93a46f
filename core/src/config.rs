//! Configuration for the producer and the watchdog.
//!
//! Stores configuration in JSON format at `~/.deadhand/config.json`.
//! Every field has a default, so a missing file or a partial file is fine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::channel::RetryPolicy;
use crate::error::{Error, Result};

/// Environment variable that turns on the debug log next to the channel file.
pub const DEBUG_ENV: &str = "DEADHAND_DEBUG";

/// Environment variable naming the watchdog executable.
pub const WATCHDOG_BIN_ENV: &str = "DEADHAND_WATCHDOG_BIN";

/// Tunables shared by both sides of the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Interval between liveness polls (ticks).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Interval between channel reads; shorter than the poll interval.
    #[serde(default = "default_read_interval_ms")]
    pub read_interval_ms: u64,

    /// How long the watchdog keeps killing after its main parent died.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Kill attempts per child before it is abandoned.
    #[serde(default = "default_max_kill_attempts")]
    pub max_kill_attempts: u32,

    /// Upper bound for a single kill call.
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,

    /// Backoff between channel I/O retries.
    #[serde(default = "default_io_retry_interval_ms")]
    pub io_retry_interval_ms: u64,

    /// Total time spent retrying one channel I/O operation.
    #[serde(default = "default_io_retry_window_ms")]
    pub io_retry_window_ms: u64,

    /// Delay before the producer retries a failed flush.
    #[serde(default = "default_flush_retry_delay_ms")]
    pub flush_retry_delay_ms: u64,

    /// Write a debug log next to the channel file.
    #[serde(default)]
    pub debug: bool,

    /// Watchdog executable; defaults to `deadhand` next to the current executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchdog_bin: Option<PathBuf>,
}

fn default_poll_interval_ms() -> u64 {
    333
}

fn default_read_interval_ms() -> u64 {
    100
}

fn default_grace_period_ms() -> u64 {
    15_000
}

fn default_max_kill_attempts() -> u32 {
    10
}

fn default_kill_timeout_ms() -> u64 {
    3_000
}

fn default_io_retry_interval_ms() -> u64 {
    333
}

fn default_io_retry_window_ms() -> u64 {
    1_000
}

fn default_flush_retry_delay_ms() -> u64 {
    1_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            read_interval_ms: default_read_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
            max_kill_attempts: default_max_kill_attempts(),
            kill_timeout_ms: default_kill_timeout_ms(),
            io_retry_interval_ms: default_io_retry_interval_ms(),
            io_retry_window_ms: default_io_retry_window_ms(),
            flush_retry_delay_ms: default_flush_retry_delay_ms(),
            debug: false,
            watchdog_bin: None,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    pub fn flush_retry_delay(&self) -> Duration {
        Duration::from_millis(self.flush_retry_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.io_retry_interval_ms),
            Duration::from_millis(self.io_retry_window_ms),
        )
    }

    /// Apply `DEADHAND_DEBUG` and `DEADHAND_WATCHDOG_BIN` from the environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(DEBUG_ENV).ok(),
            std::env::var_os(WATCHDOG_BIN_ENV).map(PathBuf::from),
        )
    }

    fn with_overrides(mut self, debug: Option<String>, watchdog_bin: Option<PathBuf>) -> Self {
        if let Some(value) = debug {
            self.debug = is_truthy(&value);
        }
        if let Some(bin) = watchdog_bin {
            self.watchdog_bin = Some(bin);
        }
        self
    }

    /// Reject values that would stall or spin the watchdog loop.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 || self.read_interval_ms == 0 {
            return Err(Error::Config("Intervals must be greater than zero".to_string()));
        }
        if self.max_kill_attempts == 0 {
            return Err(Error::Config(
                "maxKillAttempts must be at least 1".to_string(),
            ));
        }
        if self.kill_timeout_ms == 0 {
            return Err(Error::Config("killTimeoutMs must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// `"0"`, `"false"` and the empty string are off; anything else is on.
fn is_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false")
}

/// Configuration store for reading and writing settings.
pub struct ConfigStore {
    /// Path to the configuration file.
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a new config store with the default path.
    ///
    /// Default path: `~/.deadhand/config.json`
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self {
            config_path: home.join(".deadhand").join("config.json"),
        })
    }

    /// Create a config store with a custom path.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load settings from disk.
    ///
    /// Returns default settings if the file doesn't exist.
    pub async fn load(&self) -> Result<Settings> {
        if !self.config_path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(config_dir) = self.config_path.parent() {
            fs::create_dir_all(config_dir)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write atomically by writing to temp file then renaming
        let temp_path = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (ConfigStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        (ConfigStore::with_path(path), dir)
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _dir) = test_store();
        assert_eq!(store.load().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _dir) = test_store();

        let settings = Settings {
            poll_interval_ms: 50,
            grace_period_ms: 2_000,
            debug: true,
            ..Settings::default()
        };
        store.save(&settings).await.unwrap();

        assert_eq!(store.load().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.config_path().parent().unwrap())
            .await
            .unwrap();
        fs::write(store.config_path(), r#"{"maxKillAttempts": 3}"#)
            .await
            .unwrap();

        let settings = store.load().await.unwrap();
        assert_eq!(settings.max_kill_attempts, 3);
        assert_eq!(settings.poll_interval_ms, 333);
        assert_eq!(settings.grace_period(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.config_path().parent().unwrap())
            .await
            .unwrap();
        fs::write(store.config_path(), r#"{"pollIntervalMs": 0}"#)
            .await
            .unwrap();

        assert!(matches!(store.load().await, Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::default()
            .with_overrides(Some("1".to_string()), Some(PathBuf::from("/opt/deadhand")));
        assert!(settings.debug);
        assert_eq!(settings.watchdog_bin, Some(PathBuf::from("/opt/deadhand")));

        let settings = Settings {
            debug: true,
            ..Settings::default()
        }
        .with_overrides(Some("false".to_string()), None);
        assert!(!settings.debug);
    }
}
