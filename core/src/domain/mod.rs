//! Domain layer - Pure business logic and data models.
//!
//! This module contains the protocol and bookkeeping types shared by the
//! producer and the watchdog. They have no I/O dependencies and can be tested
//! in isolation.

mod message;
mod pid;
mod records;
mod registration;
mod snapshot;
mod watermark;

pub use message::{now_ms, Ack, ChannelMessage, MessageKind};
pub use pid::{KillSignal, Pid};
pub use records::{ChildRecord, DoomReason, Liveness, ParentRecord, CONFIRM_DEAD_POLLS};
pub use registration::{normalize_name, ChildOptions, ChildRegistration, Registration};
pub use snapshot::ProcessSnapshot;
pub use watermark::Watermarks;
