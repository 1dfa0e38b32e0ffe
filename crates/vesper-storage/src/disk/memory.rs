//! In-memory disk manager.
//!
//! The in-memory twin of [`FileDiskManager`]: the same contract with a
//! `HashMap` behind it instead of a file. It additionally counts every
//! operation, which lets tests observe exactly which I/O the buffer pool
//! performed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use vesper_common::types::PageId;

use super::error::{IoError, IoResult};
use super::DiskManager;

/// In-memory page store with per-operation counters.
pub struct MemDiskManager {
    page_size: usize,
    inner: Mutex<MemInner>,
    reads: AtomicU64,
    writes: AtomicU64,
}

struct MemInner {
    pages: HashMap<PageId, Vec<u8>>,
    write_counts: HashMap<PageId, u64>,
    next_page_id: u64,
    free_ids: Vec<PageId>,
}

impl MemDiskManager {
    /// Creates an empty store for pages of `page_size` bytes.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            inner: Mutex::new(MemInner {
                pages: HashMap::new(),
                write_counts: HashMap::new(),
                next_page_id: 0,
                free_ids: Vec::new(),
            }),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Total `read_page` calls.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Total `write_page` calls.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// `write_page` calls for one specific page.
    pub fn writes_for(&self, page_id: PageId) -> u64 {
        self.inner
            .lock()
            .write_counts
            .get(&page_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of pages that currently hold written data.
    pub fn page_count(&self) -> usize {
        self.inner.lock().pages.len()
    }

    fn check_buf(&self, len: usize) -> IoResult<()> {
        if len != self.page_size {
            return Err(IoError::BadBufferLength {
                page_size: self.page_size,
                buffer_len: len,
            });
        }
        Ok(())
    }
}

impl DiskManager for MemDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> IoResult<()> {
        self.check_buf(buf.len())?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.lock();
        match inner.pages.get(&page_id) {
            Some(page) => buf.copy_from_slice(page),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> IoResult<()> {
        self.check_buf(buf.len())?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        inner.pages.insert(page_id, buf.to_vec());
        *inner.write_counts.entry(page_id).or_insert(0) += 1;
        Ok(())
    }

    fn allocate_page(&self) -> IoResult<PageId> {
        let mut inner = self.inner.lock();
        if let Some(page_id) = inner.free_ids.pop() {
            return Ok(page_id);
        }
        let page_id = PageId::new(inner.next_page_id);
        inner.next_page_id += 1;
        Ok(page_id)
    }

    fn deallocate_page(&self, page_id: PageId) -> IoResult<()> {
        let mut inner = self.inner.lock();
        inner.pages.remove(&page_id);
        inner.free_ids.push(page_id);
        Ok(())
    }
}

impl std::fmt::Debug for MemDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemDiskManager")
            .field("page_size", &self.page_size)
            .field("pages", &self.page_count())
            .field("reads", &self.reads())
            .field("writes", &self.writes())
            .finish()
    }
}
