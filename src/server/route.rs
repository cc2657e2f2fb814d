//! Observer request routing
//!
//! Observers attach at `/logstream/<key>`. The key must consist of
//! `[-0-9A-Za-z.]` and additionally pass the configured `KeyPolicy`:
//!
//! - `hostname`: every dot-separated label starts with a letter and contains
//!   only letters, digits and `-`
//! - `uuid`: canonical hyphenated UUID (`8-4-4-4-12` hex digits)
//! - `any`: either of the above
//!
//! An optional `lastMod` query parameter (hex nanoseconds since the epoch) is
//! accepted for compatibility. Attaching always replays the full history.

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::hub::RoutingKey;

/// Path prefix observers attach under
pub const LOGSTREAM_PREFIX: &str = "/logstream/";

/// Which routing key shapes observers may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    /// Fully qualified or short host names
    #[default]
    Hostname,
    /// Canonical UUIDs (task identifiers)
    Uuid,
    /// Host names or UUIDs
    Any,
}

impl KeyPolicy {
    /// Check a key against this policy
    pub fn accepts(&self, key: &str) -> bool {
        match self {
            KeyPolicy::Hostname => is_valid_hostname(key),
            KeyPolicy::Uuid => is_canonical_uuid(key),
            KeyPolicy::Any => is_valid_hostname(key) || is_canonical_uuid(key),
        }
    }
}

impl std::fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            KeyPolicy::Hostname => "hostname",
            KeyPolicy::Uuid => "uuid",
            KeyPolicy::Any => "any",
        };
        f.write_str(s)
    }
}

impl FromStr for KeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hostname" => Ok(KeyPolicy::Hostname),
            "uuid" => Ok(KeyPolicy::Uuid),
            "any" => Ok(KeyPolicy::Any),
            other => Err(format!(
                "Invalid key policy: '{}'. Expected hostname, uuid or any",
                other
            )),
        }
    }
}

/// Error type for request routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Path is not `/logstream/<key>`
    NotFound(String),
    /// Key is well-formed for the path but rejected by the key policy
    InvalidKey { key: String, policy: KeyPolicy },
}

impl RouteError {
    /// HTTP status to refuse the upgrade with
    pub fn status_code(&self) -> u16 {
        match self {
            RouteError::NotFound(_) => 404,
            RouteError::InvalidKey { .. } => 400,
        }
    }
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::NotFound(path) => write!(f, "No log stream at path: {}", path),
            RouteError::InvalidKey { key, policy } => {
                write!(f, "Key '{}' is not a valid {} key", key, policy)
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// A validated attach request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Key to attach to
    pub key: RoutingKey,
    /// Resume hint from `lastMod`, if supplied and well-formed
    pub last_mod: Option<SystemTime>,
}

/// Parse and validate an attach request
pub fn parse_route(
    path: &str,
    query: Option<&str>,
    policy: KeyPolicy,
) -> Result<Route, RouteError> {
    let key = path
        .strip_prefix(LOGSTREAM_PREFIX)
        .filter(|key| !key.is_empty() && key.chars().all(is_path_key_char))
        .ok_or_else(|| RouteError::NotFound(path.to_string()))?;

    if !policy.accepts(key) {
        return Err(RouteError::InvalidKey {
            key: key.to_string(),
            policy,
        });
    }

    Ok(Route {
        key: RoutingKey::new(key),
        last_mod: query.and_then(parse_last_mod),
    })
}

fn is_path_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

/// Every label starts with a letter and continues with letters, digits or `-`
pub fn is_valid_hostname(key: &str) -> bool {
    key.split('.').all(|label| {
        let mut chars = label.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
            }
            _ => false,
        }
    })
}

/// Hyphenated `8-4-4-4-12` UUID
pub fn is_canonical_uuid(key: &str) -> bool {
    // Only the hyphenated form is 36 characters long
    key.len() == 36 && uuid::Uuid::try_parse(key).is_ok()
}

fn parse_last_mod(query: &str) -> Option<SystemTime> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "lastMod")
        .and_then(|(_, value)| u64::from_str_radix(value, 16).ok())
        .map(|nanos| UNIX_EPOCH + Duration::from_nanos(nanos))
}
