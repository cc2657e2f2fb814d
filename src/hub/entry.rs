//! Per-key entry and stats types
//!
//! This module defines the state the hub keeps for each routing key: its
//! history buffer and its subscriber set, always locked together.

use std::time::Instant;

use super::config::HubConfig;
use super::history::HistoryBuffer;
use super::subscriber::SubscriberRegistry;

/// Entry for a single routing key in the hub
#[derive(Debug)]
pub struct KeyEntry {
    /// Recent lines for late-joiner catch-up
    pub history: HistoryBuffer,

    /// Observers currently attached to this key
    pub subscribers: SubscriberRegistry,

    /// When the entry was created
    pub created_at: Instant,

    /// When the last line was ingested for this key
    pub last_ingest_at: Option<Instant>,
}

impl KeyEntry {
    /// Create a new, empty key entry
    pub(super) fn new(config: &HubConfig) -> Self {
        Self {
            history: HistoryBuffer::with_max_lines(config.buffer_max_lines),
            subscribers: SubscriberRegistry::new(),
            created_at: Instant::now(),
            last_ingest_at: None,
        }
    }

    /// Get the number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Stats for this key
    pub fn stats(&self) -> KeyStats {
        KeyStats {
            buffered_lines: self.history.len(),
            total_ingested: self.history.total_appended(),
            subscribers: self.subscribers.len(),
            idle_for: self.last_ingest_at.map(|t| t.elapsed()),
            age: self.created_at.elapsed(),
        }
    }
}

/// Statistics for one routing key
#[derive(Debug, Clone)]
pub struct KeyStats {
    /// Lines currently held in the history buffer
    pub buffered_lines: usize,
    /// Lines ever ingested for this key
    pub total_ingested: u64,
    /// Number of attached subscribers
    pub subscribers: usize,
    /// Time since the last ingested line (None if nothing was ingested yet)
    pub idle_for: Option<std::time::Duration>,
    /// Time since the key was first seen
    pub age: std::time::Duration,
}
