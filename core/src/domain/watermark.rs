//! Per-producer ack high-water marks.

use std::collections::HashMap;

use uuid::Uuid;

use super::{Ack, ChannelMessage};

/// Highest applied ack for each producer writing to a channel.
///
/// Acks are only ordered within one producer, so every producer gets its own
/// mark. Messages without a producer id share one anonymous stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watermarks {
    marks: HashMap<Option<Uuid>, Ack>,
}

impl Watermarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest ack applied for `producer`, or 0.
    pub fn get(&self, producer: Option<Uuid>) -> Ack {
        self.marks.get(&producer).copied().unwrap_or(0)
    }

    /// Whether `message` is above its producer's mark.
    pub fn admits(&self, message: &ChannelMessage) -> bool {
        message.ack > self.get(message.producer)
    }

    /// Record `message` as applied. Returns false when it was not above the mark.
    pub fn advance(&mut self, message: &ChannelMessage) -> bool {
        let mark = self.marks.entry(message.producer).or_insert(0);
        if message.ack <= *mark {
            return false;
        }
        *mark = message.ack;
        true
    }

    /// Number of producers seen.
    pub fn producers(&self) -> usize {
        self.marks.len()
    }
}
