//! Observer transport
//!
//! Accepts TCP connections, upgrades `/logstream/<key>` requests to WebSocket
//! and hands each observer to an `ObserverSession`. Requests for other paths
//! are refused with 404 and keys failing the configured `KeyPolicy` with 400,
//! both before the hub is touched.

pub mod config;
pub mod listener;
pub mod route;

pub use config::ServerConfig;
pub use listener::LogstreamServer;
pub use route::{parse_route, KeyPolicy, Route, RouteError};
