//! Config command - show or initialize the configuration file.

use anyhow::{Context, Result};
use deadhand_core::{ConfigStore, Settings};

/// Print the effective settings. With `init`, write them to the config file
/// first so there is something to edit.
pub async fn show(store: &ConfigStore, init: bool, json: bool) -> Result<()> {
    let settings = effective(store, init).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    println!("Config file: {}", store.config_path().display());
    if init {
        println!("(written)");
    }
    println!();
    println!("  pollIntervalMs:     {}", settings.poll_interval_ms);
    println!("  readIntervalMs:     {}", settings.read_interval_ms);
    println!("  gracePeriodMs:      {}", settings.grace_period_ms);
    println!("  maxKillAttempts:    {}", settings.max_kill_attempts);
    println!("  killTimeoutMs:      {}", settings.kill_timeout_ms);
    println!("  ioRetryIntervalMs:  {}", settings.io_retry_interval_ms);
    println!("  ioRetryWindowMs:    {}", settings.io_retry_window_ms);
    println!("  flushRetryDelayMs:  {}", settings.flush_retry_delay_ms);
    println!("  debug:              {}", settings.debug);
    match &settings.watchdog_bin {
        Some(bin) => println!("  watchdogBin:        {}", bin.display()),
        None => println!("  watchdogBin:        (next to the current executable)"),
    }
    Ok(())
}

async fn effective(store: &ConfigStore, init: bool) -> Result<Settings> {
    let settings = store
        .load()
        .await
        .with_context(|| format!("Failed to load {}", store.config_path().display()))?;

    if init {
        store
            .save(&settings)
            .await
            .with_context(|| format!("Failed to write {}", store.config_path().display()))?;
    }
    Ok(settings.with_env_overrides())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::with_path(dir.path().join("nested").join("config.json"));

        effective(&store, false).await.unwrap();
        assert!(!store.config_path().exists());

        effective(&store, true).await.unwrap();
        assert!(store.config_path().exists());
        let text = std::fs::read_to_string(store.config_path()).unwrap();
        assert!(text.contains("\"pollIntervalMs\""));
        assert_eq!(store.load().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_init_keeps_existing_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::with_path(dir.path().join("config.json"));
        std::fs::write(store.config_path(), r#"{"gracePeriodMs": 250}"#).unwrap();

        let settings = effective(&store, true).await.unwrap();
        assert_eq!(settings.grace_period_ms, 250);
        assert_eq!(store.load().await.unwrap().grace_period_ms, 250);
    }
}
