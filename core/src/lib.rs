//! Deadhand Core Library
//!
//! Kills registered child processes when the processes they belong to die,
//! even when those die abruptly (`SIGKILL`, crashes) and never run cleanup.
//! Provides:
//! - A `Producer` API that registers parents and children
//! - A detached `Watchdog` that polls liveness and kills orphaned children
//! - The append-only, ack-ordered channel file connecting the two
//! - User configuration (intervals, grace period, kill attempts)
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Protocol messages and watchdog bookkeeping
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: OS process table and signal delivery
//! - `channel`: File I/O for the message channel
//! - `watchdog` / `producer`: The two sides of the channel
//!
//! # Platform Support
//! - macOS / Linux: Uses `ps` for liveness and POSIX signals for killing
//! - Windows: Uses `tasklist` and `taskkill /T`

// Hexagonal architecture layers
pub mod domain;
pub mod ports;
pub mod adapters;

pub mod channel;
pub mod config;
pub mod error;
pub mod producer;
pub mod watchdog;

// Re-export domain types (primary API)
pub use domain::{
    Ack, ChannelMessage, ChildOptions, ChildRegistration, KillSignal, MessageKind, Pid,
    ProcessSnapshot, Registration, Watermarks,
};

// Re-export other commonly used types
pub use adapters::{ProcessTable, TreeKiller};
pub use config::{ConfigStore, Settings};
pub use error::{Error, KillError, Result};
pub use producer::{Namespace, Producer, ProducerRegistry};
pub use watchdog::{ExitReport, Phase, Watchdog};
