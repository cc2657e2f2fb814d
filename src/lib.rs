//! Syslog to WebSocket log fan-out
//!
//! Log lines arrive over UDP syslog, keyed by the sending host. Observers
//! attach over WebSocket at `/logstream/<key>` and receive the key's recent
//! history as one frame, followed by every new line for that key as it
//! arrives.
//!
//! ```text
//!  syslog (UDP) ──► SyslogListener ──► BroadcastHub ──► ObserverSession ──► WebSocket
//!                                       │ per key:
//!                                       │   HistoryBuffer
//!                                       │   SubscriberRegistry
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use logstream::{BroadcastHub, HubConfig, LogstreamServer, ServerConfig};
//!
//! # async fn run() -> logstream::Result<()> {
//! let hub = Arc::new(BroadcastHub::with_config(HubConfig::default()));
//! let server = LogstreamServer::bind(ServerConfig::default(), Arc::clone(&hub)).await?;
//! server.run().await
//! # }
//! ```

pub mod error;
pub mod hub;
pub mod ingest;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use hub::{BroadcastHub, HubConfig, RoutingKey, Subscription};
pub use ingest::{SyslogConfig, SyslogListener};
pub use server::{KeyPolicy, LogstreamServer, ServerConfig};
pub use stats::HubStats;
