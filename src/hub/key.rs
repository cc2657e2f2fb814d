//! Routing keys and log lines
//!
//! This module defines the key that partitions the log stream and the line
//! type that is fanned out to observers.

use std::sync::Arc;

/// Identifier of one logical log stream (host name or task identifier)
///
/// Equality is exact string match. There is no hierarchy between keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingKey(Arc<str>);

impl RoutingKey {
    /// Create a new routing key
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoutingKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for RoutingKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

impl std::borrow::Borrow<str> for RoutingKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One line of log text
///
/// Shared between the history buffer and every subscriber queue, so cloning
/// only bumps a reference count.
pub type LogLine = Arc<str>;

/// A record handed to the hub by an ingestion adapter
#[derive(Debug, Clone)]
pub struct IngestedMessage {
    /// Routing key the record belongs to
    pub key: RoutingKey,
    /// Record text, stored as-is
    pub text: LogLine,
}

impl IngestedMessage {
    /// Create a message
    pub fn new(key: impl Into<RoutingKey>, text: impl Into<LogLine>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_key_equality_is_exact() {
        assert_eq!(RoutingKey::new("web-1"), RoutingKey::from("web-1"));
        assert_ne!(RoutingKey::new("web-1"), RoutingKey::new("Web-1"));
        assert_ne!(RoutingKey::new("web"), RoutingKey::new("web.example.com"));
    }

    #[test]
    fn test_key_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(RoutingKey::new("task-foo"), 1);

        assert_eq!(map.get("task-foo"), Some(&1));
        assert_eq!(map.get("task-bar"), None);
    }

    #[test]
    fn test_message_new() {
        let msg = IngestedMessage::new("h1", "hello");

        assert_eq!(msg.key.as_str(), "h1");
        assert_eq!(&*msg.text, "hello");
    }
}
