//! Broadcast hub implementation
//!
//! The central hub that keeps per-key history and fans ingested lines out to
//! attached observers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::stats::{HubCounters, HubStats};

use super::config::HubConfig;
use super::entry::{KeyEntry, KeyStats};
use super::error::HubError;
use super::key::{IngestedMessage, LogLine, RoutingKey};
use super::subscriber::{DetachReason, Evicted, Subscriber, Subscription};

/// Central hub for all routing keys
///
/// The outer map is only locked to find or create a key's entry. Each entry
/// has its own mutex, which serializes `ingest` against
/// `snapshot_and_register` for that key while unrelated keys proceed in
/// parallel. No lock is held across an await point.
pub struct BroadcastHub {
    /// Map of routing key to key entry
    keys: RwLock<HashMap<RoutingKey, Arc<Mutex<KeyEntry>>>>,

    /// Configuration
    config: HubConfig,

    next_subscriber_id: AtomicU64,

    closed: AtomicBool,

    counters: HubCounters,
}

impl BroadcastHub {
    /// Create a new hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration
    pub fn with_config(config: HubConfig) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            config,
            next_subscriber_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            counters: HubCounters::new(),
        }
    }

    /// Find the entry for a key, creating it on first use
    fn entry(&self, key: &RoutingKey) -> Arc<Mutex<KeyEntry>> {
        if let Some(entry) = self.keys.read().get(key) {
            return Arc::clone(entry);
        }

        let mut keys = self.keys.write();
        let entry = keys.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(key = %key, "Key entry created");
            Arc::new(Mutex::new(KeyEntry::new(&self.config)))
        });
        Arc::clone(entry)
    }

    fn existing_entry(&self, key: &str) -> Option<Arc<Mutex<KeyEntry>>> {
        self.keys.read().get(key).map(Arc::clone)
    }

    /// Append a line to a key's history and deliver it to the key's observers
    ///
    /// Never waits on a subscriber: an observer whose queue is full is
    /// detached instead. Returns the number of subscribers the line was
    /// delivered to.
    pub fn ingest(&self, key: &RoutingKey, text: impl Into<LogLine>) -> usize {
        if self.is_closed() {
            self.counters.message_dropped();
            return 0;
        }

        let line = text.into();
        let entry_arc = self.entry(key);

        let (delivered, evicted) = {
            let mut entry = entry_arc.lock();
            entry.history.append(Arc::clone(&line));
            entry.last_ingest_at = Some(Instant::now());
            entry.subscribers.deliver(&line)
        };

        self.counters.message_ingested();

        for Evicted { subscriber, reason } in evicted {
            self.counters.subscriber_evicted();
            tracing::warn!(
                key = %key,
                subscriber_id = subscriber.id(),
                reason = %reason,
                "Subscriber evicted"
            );
            subscriber.detach(reason);
        }

        delivered
    }

    /// Ingest a message produced by an ingestion adapter
    pub fn ingest_message(&self, message: IngestedMessage) -> usize {
        self.ingest(&message.key, message.text)
    }

    /// Snapshot a key's history and register a new subscriber, atomically
    ///
    /// A line ingested before this call is in the returned snapshot; a line
    /// ingested after it is delivered to the subscription's queue. No line is
    /// in both and none is missed. Attaching to a key with no history is fine:
    /// the snapshot is just empty.
    pub fn snapshot_and_register(
        self: &Arc<Self>,
        key: &RoutingKey,
    ) -> Result<Subscription, HubError> {
        if self.is_closed() {
            return Err(HubError::Closed);
        }

        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (subscriber, receiver, reason) =
            Subscriber::new(id, self.config.subscriber_queue_capacity);

        let entry_arc = self.entry(key);
        let (snapshot, subscribers) = {
            let mut entry = entry_arc.lock();

            // Checked under the entry lock so shutdown cannot miss this subscriber
            if self.is_closed() {
                return Err(HubError::Closed);
            }

            let snapshot = entry.history.snapshot();
            entry.subscribers.add(subscriber);
            (snapshot, entry.subscriber_count())
        };

        tracing::info!(
            key = %key,
            subscriber_id = id,
            subscribers = subscribers,
            catchup_lines = snapshot.len(),
            "Subscriber added"
        );

        Ok(Subscription::new(
            id,
            key.clone(),
            snapshot,
            receiver,
            reason,
            Arc::clone(self),
        ))
    }

    /// Remove a subscriber and close its queue
    ///
    /// Returns false if the subscriber was not registered (already removed or
    /// evicted). Calling this twice is harmless.
    pub fn unregister(&self, key: &RoutingKey, id: u64) -> bool {
        let Some(entry_arc) = self.existing_entry(key.as_str()) else {
            return false;
        };

        let (removed, remaining) = {
            let mut entry = entry_arc.lock();
            let removed = entry.subscribers.remove(id);
            (removed, entry.subscriber_count())
        };

        match removed {
            Some(subscriber) => {
                subscriber.detach(DetachReason::Unregistered);
                tracing::debug!(
                    key = %key,
                    subscriber_id = id,
                    subscribers = remaining,
                    "Subscriber removed"
                );
                true
            }
            None => false,
        }
    }

    /// Copy of a key's history (empty for unknown keys)
    pub fn snapshot(&self, key: &str) -> Vec<LogLine> {
        self.existing_entry(key)
            .map(|entry| entry.lock().history.snapshot())
            .unwrap_or_default()
    }

    /// Stop accepting subscribers and detach every current one
    ///
    /// Queued lines remain readable by their observers, which then see
    /// end-of-stream with `DetachReason::Shutdown`.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let entries: Vec<Arc<Mutex<KeyEntry>>> = self.keys.read().values().cloned().collect();

        let mut detached = 0;
        for entry_arc in entries {
            let drained = entry_arc.lock().subscribers.drain();
            detached += drained.len();
            for subscriber in drained {
                subscriber.detach(DetachReason::Shutdown);
            }
        }

        tracing::info!(subscribers = detached, "Broadcast hub shut down");
    }

    /// Check whether `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get statistics for one key
    pub fn key_stats(&self, key: &str) -> Option<KeyStats> {
        self.existing_entry(key).map(|entry| entry.lock().stats())
    }

    /// Number of subscribers attached to a key
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.existing_entry(key)
            .map(|entry| entry.lock().subscriber_count())
            .unwrap_or(0)
    }

    /// Get total number of keys seen
    pub fn key_count(&self) -> usize {
        self.keys.read().len()
    }

    /// Get hub-wide statistics
    pub fn stats(&self) -> HubStats {
        let entries: Vec<Arc<Mutex<KeyEntry>>> = self.keys.read().values().cloned().collect();
        let subscribers = entries.iter().map(|e| e.lock().subscriber_count()).sum();
        self.counters.snapshot(entries.len(), subscribers)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
