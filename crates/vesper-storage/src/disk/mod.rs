//! Disk management for page I/O.
//!
//! The buffer pool consumes the [`DiskManager`] trait and never touches
//! files directly. Two implementations are provided: [`FileDiskManager`]
//! for a single-file on-disk store, and [`MemDiskManager`], an in-memory
//! twin that counts its operations for tests and tooling.

mod error;
mod file;
mod memory;

pub use error::{IoError, IoResult};
pub use file::FileDiskManager;
pub use memory::MemDiskManager;

use vesper_common::types::PageId;

/// Interface to the on-disk page store.
///
/// All calls are synchronous; the buffer pool invokes them while holding
/// its latch. `buf` always spans exactly one page.
pub trait DiskManager: Send + Sync {
    /// Fills `buf` with the on-disk contents of `page_id`.
    ///
    /// Pages that have never been written read as zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> IoResult<()>;

    /// Persists `buf` as the contents of `page_id`.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> IoResult<()>;

    /// Reserves and returns a fresh page ID.
    fn allocate_page(&self) -> IoResult<PageId>;

    /// Marks a page ID unused; the ID may be handed out again later.
    fn deallocate_page(&self, page_id: PageId) -> IoResult<()>;
}
