//! Syslog ingestion
//!
//! Turns RFC 5424 datagrams into `{key, text}` records for the hub: the
//! HOSTNAME field is the routing key and MSG is the text.

pub mod config;
pub mod listener;
pub mod syslog;

pub use config::SyslogConfig;
pub use listener::SyslogListener;
pub use syslog::{ParseError, SyslogMessage};
