//! Statistics for the hub and the syslog listener

pub mod metrics;

pub use metrics::{HubCounters, HubStats, IngestCounters, IngestStats};
