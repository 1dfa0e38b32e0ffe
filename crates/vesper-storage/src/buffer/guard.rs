//! RAII pin guard for buffer pool pages.
//!
//! A [`PageGuard`] keeps its page pinned for as long as it lives and
//! unpins through the pool on drop, reporting whether the payload was
//! modified. It is sugar over the pool's explicit fetch/unpin operations.

use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use vesper_common::types::PageId;

use super::frame::BufferFrame;
use super::pool::BufferPool;

/// A pinned page, unpinned automatically on drop.
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    frame: Arc<BufferFrame>,
    page_id: PageId,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(pool: &'a BufferPool, frame: Arc<BufferFrame>) -> Self {
        let page_id = frame.page_id();
        Self {
            pool,
            frame,
            page_id,
            dirty: false,
        }
    }

    /// Returns the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the underlying frame.
    #[inline]
    pub fn frame(&self) -> &BufferFrame {
        &self.frame
    }

    /// Returns a read lock on the page data.
    #[inline]
    pub fn data(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.frame.read_data()
    }

    /// Returns a write lock on the page data and marks the page dirty.
    #[inline]
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.dirty = true;
        self.frame.write_data()
    }

    /// Marks the page dirty without touching the payload.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        let _ = self.pool.unpin_page(self.page_id, self.dirty);
    }
}

impl std::fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame.frame_id())
            .field("dirty", &self.dirty)
            .finish()
    }
}
