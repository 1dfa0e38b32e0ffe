//! System-wide constants for VesperDB.

// =============================================================================
// Page and Memory Constants
// =============================================================================

/// Default page size in bytes (8 KB).
///
/// A common page size that balances I/O efficiency with memory usage.
/// It matches the typical SSD block size and OS page size.
pub const DEFAULT_PAGE_SIZE: usize = 8 * 1024;

/// Minimum page size in bytes (4 KB).
pub const MIN_PAGE_SIZE: usize = 4 * 1024;

/// Maximum page size in bytes (64 KB).
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

// =============================================================================
// Buffer Pool Constants
// =============================================================================

/// Default buffer pool size (64 MB).
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64 * 1024 * 1024;

/// Minimum buffer pool size (16 MB).
pub const MIN_BUFFER_POOL_SIZE: usize = 16 * 1024 * 1024;
