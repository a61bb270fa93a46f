//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces the watchdog uses to interact with the
//! operating system. Implementations live in `adapters`; tests substitute
//! in-memory mocks.

mod killer;
mod process_table;

pub use killer::ProcessKillerPort;
pub use process_table::ProcessTablePort;
