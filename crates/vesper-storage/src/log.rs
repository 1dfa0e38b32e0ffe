//! Write-ahead log interface consumed by the buffer pool.
//!
//! The buffer pool does not implement logging itself. When a log manager
//! is configured, the pool flushes the log through a dirty frame's LSN
//! before writing the frame back, so log records always reach disk before
//! the pages they describe. Absence of a log manager is tolerated
//! everywhere.

use vesper_common::types::Lsn;

use crate::disk::IoResult;

/// Interface to a write-ahead log.
pub trait LogManager: Send + Sync {
    /// Returns the LSN of the most recent log record.
    fn latest_lsn(&self) -> Lsn;

    /// Blocks until every log record up to and including `lsn` is durable.
    fn flush_until(&self, lsn: Lsn) -> IoResult<()>;
}
