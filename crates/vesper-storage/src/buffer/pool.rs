//! Buffer pool implementation.
//!
//! The pool owns the frame array; the page table, replacer, and free
//! list hold `FrameId` handles into it. One latch serializes every
//! operation end to end, including the disk calls it makes, so the five
//! public operations are linearizable. Lock order is always pool latch
//! first, then the page table's or replacer's own mutex; the latter two
//! are never nested with each other.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};
use vesper_common::types::PageId;
use vesper_hash::ExtendibleHashTable;

use super::config::BufferPoolConfig;
use super::error::{BufferError, BufferResult};
use super::frame::{BufferFrame, FrameId};
use super::guard::PageGuard;
use super::replacer::LruReplacer;
use super::BufferPoolStats;
use crate::disk::DiskManager;
use crate::log::LogManager;

/// Containers tracking frame residency, guarded by the pool latch.
struct PoolState {
    /// Maps each resident page to the frame holding it.
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Unpinned occupied frames, in eviction order.
    replacer: LruReplacer<FrameId>,
    /// Unoccupied frames.
    free_list: VecDeque<FrameId>,
}

/// The buffer pool caches disk pages in a fixed set of in-memory frames.
///
/// Callers fetch pages (pinning them), read or modify the payload, and
/// unpin when done, reporting whether they dirtied the page. Unpinned
/// pages stay resident until their frame is recycled for another page;
/// dirty pages are written back before recycling.
///
/// Every frame is in exactly one of three states: free (unoccupied),
/// evictable (occupied, unpinned, tracked by the replacer), or pinned.
pub struct BufferPool {
    config: BufferPoolConfig,
    /// Frame storage. Created once; the pool is the only owner.
    frames: Vec<Arc<BufferFrame>>,
    /// The latch: held exclusively for the whole of every operation.
    state: Mutex<PoolState>,
    disk: Arc<dyn DiskManager>,
    log: Option<Arc<dyn LogManager>>,
    fetch_count: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    eviction_count: AtomicU64,
    flush_count: AtomicU64,
}

impl BufferPool {
    /// Creates a buffer pool over `disk` with the given configuration.
    pub fn new(config: BufferPoolConfig, disk: Arc<dyn DiskManager>) -> BufferResult<Self> {
        Self::build(config, disk, None)
    }

    /// Creates a buffer pool that flushes `log` before dirty write-back.
    pub fn with_log_manager(
        config: BufferPoolConfig,
        disk: Arc<dyn DiskManager>,
        log: Arc<dyn LogManager>,
    ) -> BufferResult<Self> {
        Self::build(config, disk, Some(log))
    }

    fn build(
        config: BufferPoolConfig,
        disk: Arc<dyn DiskManager>,
        log: Option<Arc<dyn LogManager>>,
    ) -> BufferResult<Self> {
        config.validate().map_err(BufferError::config)?;

        let frames: Vec<Arc<BufferFrame>> = (0..config.pool_size)
            .map(|i| Arc::new(BufferFrame::new(FrameId::new(i), config.page_size)))
            .collect();
        let free_list: VecDeque<FrameId> = (0..config.pool_size).map(FrameId::new).collect();

        Ok(Self {
            state: Mutex::new(PoolState {
                page_table: ExtendibleHashTable::new(config.bucket_capacity),
                replacer: LruReplacer::new(),
                free_list,
            }),
            frames,
            disk,
            log,
            config,
            fetch_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        })
    }

    /// Fetches a page, pinning its frame.
    ///
    /// Returns `Ok(None)` when the page is not resident and every frame
    /// is pinned. The returned frame stays pinned until a matching
    /// [`unpin_page`](Self::unpin_page).
    ///
    /// # Errors
    ///
    /// `InvalidPageId` for the invalid sentinel; `Io` when the disk read
    /// or a victim write-back fails. On error the pool's bookkeeping is
    /// left consistent.
    pub fn fetch_page(&self, page_id: PageId) -> BufferResult<Option<Arc<BufferFrame>>> {
        if !page_id.is_valid() {
            return Err(BufferError::InvalidPageId { page_id });
        }
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        if let Some(frame_id) = state.page_table.get(&page_id) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            let frame = &self.frames[frame_id.index()];
            frame.pin();
            state.replacer.erase(frame_id);
            return Ok(Some(Arc::clone(frame)));
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        trace!(%page_id, "page fault");
        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };

        let frame = &self.frames[frame_id.index()];
        state.page_table.insert(page_id, frame_id);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();

        {
            let mut data = frame.write_data();
            if let Err(e) = self.disk.read_page(page_id, &mut data) {
                drop(data);
                state.page_table.remove(&page_id);
                frame.reset();
                state.free_list.push_back(frame_id);
                return Err(e.into());
            }
        }

        Ok(Some(Arc::clone(frame)))
    }

    /// Releases one pin on a page.
    ///
    /// Returns false for an unknown page or a page whose pin count is
    /// already zero. When the count reaches zero the frame becomes an
    /// eviction candidate. `is_dirty = true` sets the frame's dirty flag;
    /// the flag is sticky, so `is_dirty = false` never clears it.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();
        let Some(frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() == 0 {
            return false;
        }
        if frame.unpin() == 0 {
            state.replacer.insert(frame_id);
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        true
    }

    /// Writes a resident page's bytes to disk.
    ///
    /// Returns false for the invalid sentinel or a page that is not
    /// resident. The dirty flag is left as-is, so a later eviction of a
    /// still-dirty page writes it again.
    pub fn flush_page(&self, page_id: PageId) -> BufferResult<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }
        let state = self.state.lock();
        let Some(frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        self.write_back(&self.frames[frame_id.index()])?;
        Ok(true)
    }

    /// Deletes a page from the pool and deallocates it on disk.
    ///
    /// A page that is not resident is still deallocated. Returns false
    /// when the page is resident and pinned.
    pub fn delete_page(&self, page_id: PageId) -> BufferResult<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }
        let mut state = self.state.lock();
        let Some(frame_id) = state.page_table.get(&page_id) else {
            self.disk.deallocate_page(page_id)?;
            return Ok(true);
        };

        let frame = &self.frames[frame_id.index()];
        if frame.is_pinned() {
            return Ok(false);
        }

        state.page_table.remove(&page_id);
        state.replacer.erase(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        debug!(%page_id, frame_id = frame_id.index(), "deleted page");
        self.disk.deallocate_page(page_id)?;
        Ok(true)
    }

    /// Allocates a fresh page and pins it in a frame.
    ///
    /// Returns `Ok(None)` when every frame is pinned. The returned
    /// frame's payload is zero-filled and its `page_id()` carries the
    /// newly allocated ID.
    pub fn new_page(&self) -> BufferResult<Option<Arc<BufferFrame>>> {
        let mut state = self.state.lock();
        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.index()];

        let page_id = match self.disk.allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                frame.reset();
                state.free_list.push_back(frame_id);
                return Err(e.into());
            }
        };

        state.page_table.insert(page_id, frame_id);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        frame.zero_data();
        trace!(%page_id, frame_id = frame_id.index(), "allocated page");

        Ok(Some(Arc::clone(frame)))
    }

    /// Writes every occupied frame back to disk. Returns the number of
    /// pages written.
    pub fn flush_all(&self) -> BufferResult<usize> {
        let _state = self.state.lock();
        let mut flushed = 0;
        for frame in &self.frames {
            if frame.is_occupied() {
                self.write_back(frame)?;
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Fetches a page behind an RAII guard that unpins on drop.
    pub fn fetch_page_guarded(&self, page_id: PageId) -> BufferResult<Option<PageGuard<'_>>> {
        Ok(self
            .fetch_page(page_id)?
            .map(|frame| PageGuard::new(self, frame)))
    }

    /// Allocates a fresh page behind an RAII guard that unpins on drop.
    pub fn new_page_guarded(&self) -> BufferResult<Option<PageGuard<'_>>> {
        Ok(self.new_page()?.map(|frame| PageGuard::new(self, frame)))
    }

    /// Returns true if `page_id` is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains(&page_id)
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let state = self.state.lock();
        let mut pinned = 0;
        let mut dirty = 0;
        for frame in &self.frames {
            if frame.is_pinned() {
                pinned += 1;
            }
            if frame.is_dirty() {
                dirty += 1;
            }
        }

        BufferPoolStats {
            fetches: self.fetch_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            evictions: self.eviction_count.load(Ordering::Relaxed),
            flushes: self.flush_count.load(Ordering::Relaxed),
            pinned_frames: pinned,
            dirty_frames: dirty,
            free_frames: state.free_list.len(),
            evictable_frames: state.replacer.len(),
        }
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// Produces an unoccupied frame: the free list first, then an evicted
    /// victim. `Ok(None)` means every frame is pinned.
    ///
    /// A victim's dirty payload is written back and its page-table entry
    /// removed before the frame is handed out. If the write-back fails
    /// the victim goes back into the replacer and the error propagates.
    fn acquire_frame(&self, state: &mut PoolState) -> BufferResult<Option<FrameId>> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = state.replacer.victim() else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.index()];
        debug_assert!(frame.is_occupied() && !frame.is_pinned());

        if frame.is_dirty() {
            if let Err(e) = self.write_back(frame) {
                state.replacer.insert(frame_id);
                return Err(e);
            }
        }

        let old_page_id = frame.page_id();
        state.page_table.remove(&old_page_id);
        self.eviction_count.fetch_add(1, Ordering::Relaxed);
        debug!(page_id = %old_page_id, frame_id = frame_id.index(), "evicted page");
        Ok(Some(frame_id))
    }

    /// Writes a frame's payload to disk, honoring the log-first rule.
    ///
    /// The dirty flag is not touched here; eviction clears it implicitly
    /// by resetting the frame for its next resident.
    fn write_back(&self, frame: &BufferFrame) -> BufferResult<()> {
        if let Some(log) = &self.log {
            let lsn = frame.lsn();
            if lsn.is_valid() {
                log.flush_until(lsn)?;
            }
        }
        let data = frame.read_data();
        self.disk.write_page(frame.page_id(), &data)?;
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Asserts the frame-partition and page-table invariants. Test support.
    #[cfg(test)]
    fn check_invariants(&self) {
        use std::collections::HashSet;

        let state = self.state.lock();
        let free: HashSet<FrameId> = state.free_list.iter().copied().collect();
        assert_eq!(free.len(), state.free_list.len(), "free list has duplicates");

        let mut pinned = 0;
        let mut occupied = 0;
        for (i, frame) in self.frames.iter().enumerate() {
            let frame_id = FrameId::new(i);
            let in_free = free.contains(&frame_id);
            let in_replacer = state.replacer.contains(frame_id);
            assert!(
                !(in_free && in_replacer),
                "frame {i} on the free list and in the replacer"
            );

            if frame.is_pinned() {
                pinned += 1;
                assert!(frame.is_occupied(), "pinned frame {i} holds no page");
                assert!(
                    !in_free && !in_replacer,
                    "pinned frame {i} is tracked as reusable"
                );
            } else if frame.is_occupied() {
                assert!(
                    in_replacer && !in_free,
                    "unpinned occupied frame {i} not exactly in the replacer"
                );
            } else {
                assert!(
                    in_free && !in_replacer,
                    "unoccupied frame {i} not exactly on the free list"
                );
            }

            if frame.is_occupied() {
                occupied += 1;
                assert_eq!(
                    state.page_table.get(&frame.page_id()),
                    Some(frame_id),
                    "page table does not map frame {i}'s resident back to it"
                );
            }
        }

        assert_eq!(
            free.len() + state.replacer.len() + pinned,
            self.frames.len(),
            "free/evictable/pinned partition does not cover the pool"
        );
        assert_eq!(state.page_table.len(), occupied);
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("pool_size", &self.config.pool_size)
            .field("page_size", &self.config.page_size)
            .field("stats", &self.stats())
            .finish()
    }
}
