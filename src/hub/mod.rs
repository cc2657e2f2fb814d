//! Broadcast hub for keyed log fan-out
//!
//! The hub keeps a bounded history per routing key and routes every ingested
//! line to the observers attached to that key. Each observer has a bounded
//! queue of its own; the hub never waits on one.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<BroadcastHub>
//!                     ┌──────────────────────────┐
//!                     │ keys: HashMap<Key,       │
//!                     │   Mutex<KeyEntry {       │
//!                     │     history,             │
//!                     │     subscribers,         │
//!                     │   }>                     │
//!                     │ >                        │
//!                     └────────────┬─────────────┘
//!                                  │
//!         ┌────────────────────────┼────────────────────────┐
//!         │                        │                        │
//!         ▼                        ▼                        ▼
//!    [Syslog UDP]            [Subscription]           [Subscription]
//!    hub.ingest()            sub.recv()               sub.recv()
//!         │                        │                        │
//!         └──► append + try_send ──┴──► WebSocket text frame
//! ```
//!
//! # Attach handshake
//!
//! `snapshot_and_register` copies the key's history and inserts the new
//! subscriber while holding the key's lock, the same lock `ingest` takes. A
//! line is therefore either in the snapshot or in the queue, never both.
//!
//! # Back-pressure
//!
//! Delivery uses `try_send`. A subscriber whose queue is full is removed from
//! the registry on the spot and its queue closed, so one slow observer cannot
//! hold up the others on the same key.

pub mod config;
pub mod entry;
pub mod error;
pub mod history;
pub mod key;
pub mod store;
pub mod subscriber;

pub use config::HubConfig;
pub use entry::{KeyEntry, KeyStats};
pub use error::HubError;
pub use history::HistoryBuffer;
pub use key::{IngestedMessage, LogLine, RoutingKey};
pub use store::BroadcastHub;
pub use subscriber::{DetachReason, Subscriber, SubscriberRegistry, Subscription};
