//! Syslog listener configuration

use std::net::SocketAddr;

/// Default syslog bind address (loopback, standard port)
pub const DEFAULT_SYSLOG_ADDR: &str = "127.0.0.1:514";

/// Default maximum datagram size (8KB)
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 8192;

/// Syslog UDP listener configuration
#[derive(Debug, Clone)]
pub struct SyslogConfig {
    /// Address to bind the UDP socket to
    pub bind_addr: SocketAddr,

    /// Largest datagram read in full; longer ones are truncated
    pub max_datagram_size: usize,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 514)),
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}

impl SyslogConfig {
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

    /// Set the maximum datagram size
    pub fn max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyslogConfig::default();

        assert_eq!(config.bind_addr, DEFAULT_SYSLOG_ADDR.parse().unwrap());
        assert_eq!(config.max_datagram_size, DEFAULT_MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn test_builder() {
        let addr: SocketAddr = "0.0.0.0:5514".parse().unwrap();
        let config = SyslogConfig::default().bind(addr).max_datagram_size(1024);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_datagram_size, 1024);
        assert_eq!(SyslogConfig::with_addr(addr).bind_addr, addr);
    }
}
