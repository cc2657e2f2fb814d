//! Subscriber registry and observer-side subscriptions
//!
//! Each attached observer gets a `Subscriber` on the hub side (the sending half
//! of a bounded queue) and a `Subscription` on its own side (the receiving
//! half plus its catch-up snapshot). The `SubscriberRegistry` is the per-key set
//! of hub-side subscribers.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::history::join_lines;
use super::key::{LogLine, RoutingKey};
use super::store::BroadcastHub;

/// Why a subscriber stopped receiving lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    /// The observer side unregistered itself
    Unregistered,
    /// The delivery queue was full: the observer reads too slowly
    Overflow,
    /// The receiving half was dropped without unregistering
    Closed,
    /// The hub was shut down
    Shutdown,
}

impl std::fmt::Display for DetachReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DetachReason::Unregistered => "unregistered",
            DetachReason::Overflow => "delivery queue overflow",
            DetachReason::Closed => "queue closed",
            DetachReason::Shutdown => "hub shutdown",
        };
        f.write_str(s)
    }
}

/// Hub-side half of one attachment
#[derive(Debug)]
pub struct Subscriber {
    id: u64,
    sender: mpsc::Sender<LogLine>,
    reason: Arc<OnceLock<DetachReason>>,
}

impl Subscriber {
    /// Create a subscriber with a queue of `capacity` lines
    ///
    /// Returns the hub-side subscriber, the receiving half of its queue and the
    /// shared slot its detach reason is recorded in.
    pub(super) fn new(
        id: u64,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<LogLine>, Arc<OnceLock<DetachReason>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let reason = Arc::new(OnceLock::new());
        let subscriber = Self {
            id,
            sender,
            reason: Arc::clone(&reason),
        };
        (subscriber, receiver, reason)
    }

    /// Unique attachment ID
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enqueue a line without waiting
    #[inline]
    pub(super) fn try_deliver(&self, line: &LogLine) -> Result<(), DetachReason> {
        match self.sender.try_send(Arc::clone(line)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DetachReason::Overflow),
            Err(TrySendError::Closed(_)) => Err(DetachReason::Closed),
        }
    }

    /// Record the detach reason and close the queue
    ///
    /// Lines already queued stay readable; the observer sees end-of-stream
    /// after draining them. The first recorded reason wins.
    pub(super) fn detach(self, reason: DetachReason) {
        let _ = self.reason.set(reason);
    }
}

/// A subscriber removed from the registry during delivery
#[derive(Debug)]
pub struct Evicted {
    pub subscriber: Subscriber,
    pub reason: DetachReason,
}

/// Set of subscribers attached to one key
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: HashMap<u64, Subscriber>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscriber
    pub fn add(&mut self, subscriber: Subscriber) {
        self.subscribers.insert(subscriber.id(), subscriber);
    }

    /// Remove a subscriber by ID
    ///
    /// Removing an absent subscriber is a no-op.
    pub fn remove(&mut self, id: u64) -> Option<Subscriber> {
        self.subscribers.remove(&id)
    }

    /// Check whether a subscriber is registered
    pub fn contains(&self, id: u64) -> bool {
        self.subscribers.contains_key(&id)
    }

    /// Iterate the currently registered subscribers
    pub fn active(&self) -> impl Iterator<Item = &Subscriber> {
        self.subscribers.values()
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if no subscriber is registered
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Offer a line to every subscriber
    ///
    /// Subscribers whose queue is full or closed are removed and returned; the
    /// rest receive the line. Never waits.
    pub fn deliver(&mut self, line: &LogLine) -> (usize, Vec<Evicted>) {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for subscriber in self.active() {
            match subscriber.try_deliver(line) {
                Ok(()) => delivered += 1,
                Err(reason) => failed.push((subscriber.id(), reason)),
            }
        }

        let evicted = failed
            .into_iter()
            .filter_map(|(id, reason)| {
                self.subscribers
                    .remove(&id)
                    .map(|subscriber| Evicted { subscriber, reason })
            })
            .collect();

        (delivered, evicted)
    }

    /// Remove every subscriber
    pub fn drain(&mut self) -> Vec<Subscriber> {
        self.subscribers.drain().map(|(_, s)| s).collect()
    }
}

/// Observer-side half of one attachment
///
/// Holds the catch-up snapshot and the receiving end of the delivery queue.
/// Dropping it unregisters from the hub.
pub struct Subscription {
    id: u64,
    key: RoutingKey,
    snapshot: Vec<LogLine>,
    receiver: mpsc::Receiver<LogLine>,
    reason: Arc<OnceLock<DetachReason>>,
    hub: Arc<BroadcastHub>,
    detached: bool,
}

impl Subscription {
    pub(super) fn new(
        id: u64,
        key: RoutingKey,
        snapshot: Vec<LogLine>,
        receiver: mpsc::Receiver<LogLine>,
        reason: Arc<OnceLock<DetachReason>>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            id,
            key,
            snapshot,
            receiver,
            reason,
            hub,
            detached: false,
        }
    }

    /// Unique attachment ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Key this subscription follows
    pub fn key(&self) -> &RoutingKey {
        &self.key
    }

    /// History captured at registration, oldest first
    pub fn snapshot(&self) -> &[LogLine] {
        &self.snapshot
    }

    /// Take the snapshot out for replay, leaving it empty
    pub fn take_snapshot(&mut self) -> Vec<LogLine> {
        std::mem::take(&mut self.snapshot)
    }

    /// Snapshot joined with `\n`, or `None` if there is no history
    pub fn catchup_frame(&self) -> Option<String> {
        join_lines(self.snapshot.iter())
    }

    /// Take the snapshot out as one joined frame
    ///
    /// Returns the frame and the number of lines in it. A second call returns
    /// `None`, so history is replayed at most once.
    pub fn take_catchup_frame(&mut self) -> Option<(String, usize)> {
        let snapshot = self.take_snapshot();
        join_lines(snapshot.iter()).map(|frame| (frame, snapshot.len()))
    }

    /// Receive the next live line
    ///
    /// Returns `None` once the hub has closed the queue and every queued line
    /// has been read. `detach_reason` then says why.
    pub async fn recv(&mut self) -> Option<LogLine> {
        self.receiver.recv().await
    }

    /// Receive a live line if one is queued
    pub fn try_recv(&mut self) -> Option<LogLine> {
        self.receiver.try_recv().ok()
    }

    /// Why the hub stopped delivering, if it has
    pub fn detach_reason(&self) -> Option<DetachReason> {
        self.reason.get().copied()
    }

    /// Unregister from the hub
    ///
    /// Calling this more than once has no further effect.
    pub fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.hub.unregister(&self.key, self.id);
        self.receiver.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("snapshot_len", &self.snapshot.len())
            .field("detached", &self.detached)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
