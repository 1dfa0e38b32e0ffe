//! Integration tests for the buffer pool over a real file-backed store.
//!
//! These drive the public API end to end: pages written through the pool
//! must survive eviction, flushing, and process-level reopen of the
//! backing file.

use std::sync::Arc;

use tempfile::tempdir;
use vesper_common::types::PageId;
use vesper_storage::buffer::{BufferPool, BufferPoolConfig};
use vesper_storage::disk::{DiskManager, FileDiskManager};

const PAGE_SIZE: usize = 4096;

fn file_pool(dir: &std::path::Path, pool_size: usize) -> (BufferPool, Arc<FileDiskManager>) {
    let disk = Arc::new(FileDiskManager::open(dir.join("pages.db"), PAGE_SIZE).unwrap());
    let config = BufferPoolConfig::new(pool_size).with_page_size(PAGE_SIZE);
    let pool = BufferPool::new(config, Arc::clone(&disk) as _).unwrap();
    (pool, disk)
}

#[test]
fn pages_survive_eviction_through_file() {
    let dir = tempdir().unwrap();
    let (pool, _disk) = file_pool(dir.path(), 2);

    // Write 16 distinct pages through a 2-frame pool.
    let mut page_ids = Vec::new();
    for i in 0..16u8 {
        let frame = pool.new_page().unwrap().unwrap();
        let page_id = frame.page_id();
        frame.write_data()[..8].copy_from_slice(&[i; 8]);
        drop(frame);
        assert!(pool.unpin_page(page_id, true));
        page_ids.push(page_id);
    }

    // Every page reads back its own bytes after the pool cycled them out.
    for (i, &page_id) in page_ids.iter().enumerate() {
        let frame = pool.fetch_page(page_id).unwrap().unwrap();
        assert!(frame.read_data()[..8].iter().all(|&b| b == i as u8));
        drop(frame);
        assert!(pool.unpin_page(page_id, false));
    }
}

#[test]
fn flush_all_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let page_id;

    {
        let (pool, disk) = file_pool(dir.path(), 4);
        let mut guard = pool.new_page_guarded().unwrap().unwrap();
        page_id = guard.page_id();
        guard.data_mut()[0..4].copy_from_slice(b"vspr");
        drop(guard);

        assert_eq!(pool.flush_all().unwrap(), 1);
        disk.sync().unwrap();
    }

    // A fresh pool over the same file sees the bytes.
    let (pool, _disk) = file_pool(dir.path(), 4);
    let guard = pool.fetch_page_guarded(page_id).unwrap().unwrap();
    assert_eq!(&guard.data()[0..4], b"vspr");
}

#[test]
fn delete_page_releases_capacity() {
    let dir = tempdir().unwrap();
    let (pool, _disk) = file_pool(dir.path(), 2);

    let f0 = pool.new_page().unwrap().unwrap();
    let f1 = pool.new_page().unwrap().unwrap();
    let p0 = f0.page_id();
    drop(f0);

    // Pool is full of pinned pages.
    assert!(pool.new_page().unwrap().is_none());

    pool.unpin_page(p0, false);
    assert!(pool.delete_page(p0).unwrap());

    // The freed frame is immediately reusable.
    let f2 = pool.new_page().unwrap().unwrap();
    assert_ne!(f2.page_id(), f1.page_id());
    assert_eq!(pool.stats().free_frames, 0);
}

#[test]
fn deleted_page_id_is_recycled_by_disk() {
    let dir = tempdir().unwrap();
    let (pool, disk) = file_pool(dir.path(), 2);

    let frame = pool.new_page().unwrap().unwrap();
    let p0 = frame.page_id();
    drop(frame);
    pool.unpin_page(p0, false);

    assert!(pool.delete_page(p0).unwrap());
    assert_eq!(disk.allocate_page().unwrap(), p0);
}

#[test]
fn unknown_pages_are_ordinary_misses() {
    let dir = tempdir().unwrap();
    let (pool, _disk) = file_pool(dir.path(), 2);

    // A never-allocated page reads as zeroes rather than failing; the
    // file store backfills fresh pages on demand.
    let frame = pool.fetch_page(PageId::new(5)).unwrap().unwrap();
    assert!(frame.read_data().iter().all(|&b| b == 0));
    drop(frame);
    pool.unpin_page(PageId::new(5), false);

    assert!(!pool.flush_page(PageId::new(1234)).unwrap());
    assert!(!pool.unpin_page(PageId::new(1234), false));
}

#[test]
fn randomized_workload_preserves_page_contents() {
    use rand::prelude::*;

    let dir = tempdir().unwrap();
    let (pool, _disk) = file_pool(dir.path(), 4);
    let mut rng = StdRng::seed_from_u64(42);
    // Model of what every live page's first byte should read as.
    let mut contents: Vec<(PageId, u8)> = Vec::new();

    for _ in 0..512 {
        match rng.gen_range(0..10) {
            // Create a page with a random stamp.
            0..=3 => {
                let frame = pool.new_page().unwrap().unwrap();
                let page_id = frame.page_id();
                let stamp: u8 = rng.gen();
                frame.write_data()[0] = stamp;
                drop(frame);
                assert!(pool.unpin_page(page_id, true));
                contents.push((page_id, stamp));
            }
            // Reread a page, sometimes restamping it.
            4..=8 if !contents.is_empty() => {
                let idx = rng.gen_range(0..contents.len());
                let (page_id, stamp) = contents[idx];
                let frame = pool.fetch_page(page_id).unwrap().unwrap();
                assert_eq!(frame.read_data()[0], stamp);
                if rng.gen_bool(0.5) {
                    let restamp: u8 = rng.gen();
                    frame.write_data()[0] = restamp;
                    contents[idx].1 = restamp;
                    drop(frame);
                    assert!(pool.unpin_page(page_id, true));
                } else {
                    drop(frame);
                    assert!(pool.unpin_page(page_id, false));
                }
            }
            // Delete a page.
            9 if !contents.is_empty() => {
                let idx = rng.gen_range(0..contents.len());
                let (page_id, _) = contents.swap_remove(idx);
                assert!(pool.delete_page(page_id).unwrap());
            }
            _ => {}
        }
    }

    for (page_id, stamp) in contents {
        let frame = pool.fetch_page(page_id).unwrap().unwrap();
        assert_eq!(frame.read_data()[0], stamp);
        drop(frame);
        assert!(pool.unpin_page(page_id, false));
    }
}

#[test]
fn concurrent_readers_and_writers() {
    let dir = tempdir().unwrap();
    let disk = Arc::new(FileDiskManager::open(dir.path().join("pages.db"), PAGE_SIZE).unwrap());
    let config = BufferPoolConfig::new(8).with_page_size(PAGE_SIZE);
    let pool = Arc::new(BufferPool::new(config, Arc::clone(&disk) as _).unwrap());

    // Seed 32 pages, each stamped with its index.
    let mut page_ids = Vec::new();
    for i in 0..32u8 {
        let frame = pool.new_page().unwrap().unwrap();
        let page_id = frame.page_id();
        frame.write_data()[0] = i;
        drop(frame);
        pool.unpin_page(page_id, true);
        page_ids.push(page_id);
    }

    let page_ids = Arc::new(page_ids);
    let mut handles = Vec::new();
    for t in 0..4usize {
        let pool = Arc::clone(&pool);
        let page_ids = Arc::clone(&page_ids);
        handles.push(std::thread::spawn(move || {
            for round in 0..64usize {
                let idx = (t * 7 + round) % page_ids.len();
                let page_id = page_ids[idx];
                // The pool may be transiently full of pinned pages.
                if let Some(frame) = pool.fetch_page(page_id).unwrap() {
                    assert_eq!(frame.read_data()[0], idx as u8);
                    drop(frame);
                    assert!(pool.unpin_page(page_id, false));
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // All pins released: the whole pool is free or evictable again.
    let stats = pool.stats();
    assert_eq!(stats.pinned_frames, 0);
    assert_eq!(
        stats.free_frames + stats.evictable_frames,
        pool.pool_size()
    );
}
