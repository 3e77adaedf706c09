//! Configuration for copy operations

use crate::error::{Error, Result};
use std::time::Duration;

/// Default block size for a single transfer (1 MB)
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Default number of worker contexts
pub const DEFAULT_WORKERS: usize = 8;

/// Minimum number of worker contexts
pub const MIN_WORKERS: usize = 1;

/// Maximum number of worker contexts
pub const MAX_WORKERS: usize = 64;

/// Configuration for a copy operation
#[derive(Debug, Clone)]
pub struct CopyConfig {
    /// Size of each read/write transfer in bytes
    pub block_size: usize,

    /// Number of worker threads, one I/O context each
    pub workers: usize,

    /// How often the progress callback fires
    pub progress_interval: Duration,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            workers: DEFAULT_WORKERS,
            progress_interval: Duration::from_millis(200),
        }
    }
}

impl CopyConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transfer block size
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Set the number of workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the progress callback interval
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Check that the configuration is usable at all
    ///
    /// Device-dependent checks (sector divisibility, capacity) happen when
    /// the copy starts.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(Error::InvalidConfig(format!(
                "worker count must be between {} and {}, got {}",
                MIN_WORKERS, MAX_WORKERS, self.workers
            )));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidConfig(
                "block size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CopyConfig::default();
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CopyConfig::new()
            .block_size(64 * 1024)
            .workers(4)
            .progress_interval(Duration::from_millis(50));

        assert_eq!(config.block_size, 64 * 1024);
        assert_eq!(config.workers, 4);
        assert_eq!(config.progress_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_config_worker_bounds() {
        assert!(CopyConfig::new().workers(0).validate().is_err());
        assert!(CopyConfig::new().workers(1).validate().is_ok());
        assert!(CopyConfig::new().workers(64).validate().is_ok());
        assert!(CopyConfig::new().workers(65).validate().is_err());
    }

    #[test]
    fn test_config_rejects_zero_block_size() {
        assert!(CopyConfig::new().block_size(0).validate().is_err());
    }
}
