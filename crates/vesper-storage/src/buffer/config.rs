//! Buffer pool configuration.

use vesper_common::constants::{
    DEFAULT_BUFFER_POOL_SIZE, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
use vesper_hash::DEFAULT_BUCKET_CAPACITY;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of page frames in the buffer pool.
    pub pool_size: usize,
    /// Page size in bytes.
    pub page_size: usize,
    /// Bucket capacity of the page table's hash directory.
    pub bucket_capacity: usize,
}

impl BufferPoolConfig {
    /// Creates a new configuration with the specified number of frames.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            page_size: DEFAULT_PAGE_SIZE,
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
        }
    }

    /// Creates a configuration from a memory size in bytes.
    pub fn from_memory_size(memory_bytes: usize) -> Self {
        Self::new(memory_bytes / DEFAULT_PAGE_SIZE)
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the page table bucket capacity.
    pub fn with_bucket_capacity(mut self, bucket_capacity: usize) -> Self {
        self.bucket_capacity = bucket_capacity;
        self
    }

    /// Returns the total memory used by the frame array.
    pub fn memory_usage(&self) -> usize {
        self.pool_size * self.page_size
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.pool_size == 0 {
            return Err("pool_size must be > 0");
        }
        if !self.page_size.is_power_of_two() {
            return Err("page_size must be a power of 2");
        }
        if self.page_size < MIN_PAGE_SIZE || self.page_size > MAX_PAGE_SIZE {
            return Err("page_size out of range");
        }
        if self.bucket_capacity == 0 {
            return Err("bucket_capacity must be > 0");
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::from_memory_size(DEFAULT_BUFFER_POOL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = BufferPoolConfig::new(1000);
        assert_eq!(config.pool_size, 1000);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_memory() {
        let config = BufferPoolConfig::from_memory_size(64 * 1024 * 1024);
        assert_eq!(config.pool_size, 64 * 1024 * 1024 / DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_config_builder() {
        let config = BufferPoolConfig::new(100)
            .with_page_size(16384)
            .with_bucket_capacity(8);

        assert_eq!(config.page_size, 16384);
        assert_eq!(config.bucket_capacity, 8);
        assert_eq!(config.memory_usage(), 100 * 16384);
    }

    #[test]
    fn test_validation() {
        assert!(BufferPoolConfig::new(0).validate().is_err());
        assert!(BufferPoolConfig::new(10)
            .with_page_size(5000)
            .validate()
            .is_err());
        assert!(BufferPoolConfig::new(10)
            .with_bucket_capacity(0)
            .validate()
            .is_err());
        assert!(BufferPoolConfig::default().validate().is_ok());
    }
}
