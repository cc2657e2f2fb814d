//! Hub configuration

use super::history::DEFAULT_MAX_LINES;

/// Default capacity of each subscriber's delivery queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Broadcast hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of lines buffered per routing key
    pub buffer_max_lines: usize,

    /// Lines a subscriber may have queued before it is evicted as too slow
    pub subscriber_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer_max_lines: DEFAULT_MAX_LINES,
            subscriber_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl HubConfig {
    /// Set the per-key history size (at least 1)
    pub fn buffer_max_lines(mut self, lines: usize) -> Self {
        self.buffer_max_lines = lines.max(1);
        self
    }

    /// Set the per-subscriber queue capacity (at least 1)
    pub fn subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.buffer_max_lines, 1024);
        assert_eq!(config.subscriber_queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_builder_chaining() {
        let config = HubConfig::default()
            .buffer_max_lines(3)
            .subscriber_queue_capacity(16);

        assert_eq!(config.buffer_max_lines, 3);
        assert_eq!(config.subscriber_queue_capacity, 16);
    }

    #[test]
    fn test_builder_clamps_zero() {
        let config = HubConfig::default()
            .buffer_max_lines(0)
            .subscriber_queue_capacity(0);

        assert_eq!(config.buffer_max_lines, 1);
        assert_eq!(config.subscriber_queue_capacity, 1);
    }
}
