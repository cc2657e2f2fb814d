//! Statistics and counters for the broadcast hub and its adapters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Hub-wide statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    /// Routing keys seen so far
    pub keys: usize,
    /// Currently attached subscribers, across all keys
    pub subscribers: usize,
    /// Lines accepted by `ingest`
    pub messages_ingested: u64,
    /// Lines rejected because the hub was shut down
    pub messages_dropped: u64,
    /// Subscribers forcibly detached (slow or vanished readers)
    pub subscribers_evicted: u64,
    /// Uptime
    pub uptime: Duration,
}

/// Live counters kept by the hub
#[derive(Debug)]
pub struct HubCounters {
    started_at: Instant,
    messages_ingested: AtomicU64,
    messages_dropped: AtomicU64,
    subscribers_evicted: AtomicU64,
}

impl HubCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            messages_ingested: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            subscribers_evicted: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn message_ingested(&self) {
        self.messages_ingested.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn subscriber_evicted(&self) {
        self.subscribers_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Fill in the counter fields of a stats snapshot
    pub fn snapshot(&self, keys: usize, subscribers: usize) -> HubStats {
        HubStats {
            keys,
            subscribers,
            messages_ingested: self.messages_ingested.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            subscribers_evicted: self.subscribers_evicted.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for HubCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Syslog ingestion counters
#[derive(Debug, Default)]
pub struct IngestCounters {
    /// Datagrams read from the socket
    pub datagrams_received: AtomicU64,
    /// Datagrams that failed to parse
    pub messages_malformed: AtomicU64,
    /// Parsed messages skipped for lacking a host name
    pub messages_unrouted: AtomicU64,
}

impl IngestCounters {
    pub const fn new() -> Self {
        Self {
            datagrams_received: AtomicU64::new(0),
            messages_malformed: AtomicU64::new(0),
            messages_unrouted: AtomicU64::new(0),
        }
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> IngestStats {
        IngestStats {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            messages_malformed: self.messages_malformed.load(Ordering::Relaxed),
            messages_unrouted: self.messages_unrouted.load(Ordering::Relaxed),
        }
    }
}

/// Syslog ingestion statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub datagrams_received: u64,
    pub messages_malformed: u64,
    pub messages_unrouted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_counters_new() {
        let counters = HubCounters::new();
        let stats = counters.snapshot(0, 0);

        assert_eq!(stats.keys, 0);
        assert_eq!(stats.subscribers, 0);
        assert_eq!(stats.messages_ingested, 0);
        assert_eq!(stats.messages_dropped, 0);
        assert_eq!(stats.subscribers_evicted, 0);
    }

    #[test]
    fn test_hub_counters_accumulate() {
        let counters = HubCounters::new();
        counters.message_ingested();
        counters.message_ingested();
        counters.message_dropped();
        counters.subscriber_evicted();

        let stats = counters.snapshot(2, 5);

        assert_eq!(stats.keys, 2);
        assert_eq!(stats.subscribers, 5);
        assert_eq!(stats.messages_ingested, 2);
        assert_eq!(stats.messages_dropped, 1);
        assert_eq!(stats.subscribers_evicted, 1);
    }

    #[test]
    fn test_ingest_counters_snapshot() {
        let counters = IngestCounters::new();
        counters.datagrams_received.fetch_add(3, Ordering::Relaxed);
        counters.messages_malformed.fetch_add(1, Ordering::Relaxed);

        assert_eq!(
            counters.snapshot(),
            IngestStats {
                datagrams_received: 3,
                messages_malformed: 1,
                messages_unrouted: 0,
            }
        );
    }
}
