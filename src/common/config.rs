use std::time::Duration;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Default number of pages the buffer pool caches
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Default sleep between two lock acquisition attempts
pub const DEFAULT_LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Default upper bound a transaction waits for a single page lock before it is aborted
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a [`BufferPool`](crate::buffer::BufferPool).
///
/// Lock acquisition is polling based: a request that cannot be granted is
/// retried every `lock_retry_interval` until it succeeds, a deadlock is
/// detected, or `lock_timeout` elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Maximum number of pages held in the page cache
    pub num_pages: usize,
    /// Sleep between lock acquisition attempts
    pub lock_retry_interval: Duration,
    /// Maximum time spent waiting for one lock
    pub lock_timeout: Duration,
}

impl BufferPoolConfig {
    pub fn new(num_pages: usize) -> Self {
        Self {
            num_pages,
            ..Self::default()
        }
    }

    pub fn with_num_pages(mut self, num_pages: usize) -> Self {
        self.num_pages = num_pages;
        self
    }

    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            num_pages: DEFAULT_POOL_PAGES,
            lock_retry_interval: DEFAULT_LOCK_RETRY_INTERVAL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BufferPoolConfig::default();
        assert_eq!(config.num_pages, DEFAULT_POOL_PAGES);
        assert_eq!(config.lock_retry_interval, DEFAULT_LOCK_RETRY_INTERVAL);
        assert_eq!(config.lock_timeout, DEFAULT_LOCK_TIMEOUT);
    }

    #[test]
    fn test_config_builders() {
        let config = BufferPoolConfig::new(3)
            .with_lock_retry_interval(Duration::from_millis(1))
            .with_lock_timeout(Duration::from_millis(200));

        assert_eq!(config.num_pages, 3);
        assert_eq!(config.lock_retry_interval, Duration::from_millis(1));
        assert_eq!(config.lock_timeout, Duration::from_millis(200));
        assert_eq!(config.with_num_pages(7).num_pages, 7);
    }
}
