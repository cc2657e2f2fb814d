//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use super::route::KeyPolicy;

/// Time allowed to write one frame to an observer
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed between frames read from an observer
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Shortest liveness deadline accepted; the ping period derives from it
pub const MIN_PONG_WAIT: Duration = Duration::from_millis(10);

/// Largest message accepted from an observer
pub const DEFAULT_MAX_INBOUND_MESSAGE: usize = 512;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent observer connections (0 = unlimited)
    pub max_connections: usize,

    /// WebSocket upgrade must complete within this time
    pub handshake_timeout: Duration,

    /// Per-frame write deadline
    pub write_timeout: Duration,

    /// Disconnect if nothing (not even a pong) is read for this long
    pub pong_wait: Duration,

    /// Ping interval, must be shorter than `pong_wait`
    pub ping_period: Duration,

    /// Largest inbound message or frame in bytes
    pub max_inbound_message: usize,

    /// Which routing key shapes observers may request
    pub key_policy: KeyPolicy,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 0, // Unlimited
            handshake_timeout: Duration::from_secs(10),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            pong_wait: DEFAULT_PONG_WAIT,
            ping_period: ping_period_for(DEFAULT_PONG_WAIT),
            max_inbound_message: DEFAULT_MAX_INBOUND_MESSAGE,
            key_policy: KeyPolicy::Hostname,
            tcp_nodelay: true,
        }
    }
}

/// Ping at nine tenths of the pong wait
fn ping_period_for(pong_wait: Duration) -> Duration {
    pong_wait * 9 / 10
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the write deadline
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the liveness deadline (at least `MIN_PONG_WAIT`); the ping period
    /// follows at 9/10 of it
    pub fn pong_wait(mut self, wait: Duration) -> Self {
        self.pong_wait = wait.max(MIN_PONG_WAIT);
        self.ping_period = ping_period_for(self.pong_wait);
        self
    }

    /// Set the routing key policy
    pub fn key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    /// Set the inbound message limit
    pub fn max_inbound_message(mut self, bytes: usize) -> Self {
        self.max_inbound_message = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.pong_wait, Duration::from_secs(60));
        assert_eq!(config.ping_period, Duration::from_secs(54));
        assert_eq!(config.max_inbound_message, 512);
        assert_eq!(config.key_policy, KeyPolicy::Hostname);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9090);
    }

    #[test]
    fn test_pong_wait_moves_ping_period() {
        let config = ServerConfig::default().pong_wait(Duration::from_secs(10));

        assert_eq!(config.pong_wait, Duration::from_secs(10));
        assert_eq!(config.ping_period, Duration::from_secs(9));
        assert!(config.ping_period < config.pong_wait);
    }

    #[test]
    fn test_pong_wait_is_clamped() {
        let config = ServerConfig::default().pong_wait(Duration::ZERO);

        assert_eq!(config.pong_wait, MIN_PONG_WAIT);
        assert!(!config.ping_period.is_zero());
        assert!(config.ping_period < config.pong_wait);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .write_timeout(Duration::from_secs(5))
            .key_policy(KeyPolicy::Any)
            .max_inbound_message(1024);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.key_policy, KeyPolicy::Any);
        assert_eq!(config.max_inbound_message, 1024);
    }
}
