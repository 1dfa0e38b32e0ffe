//! # vesper-storage
//!
//! Page-buffering storage core for VesperDB.
//!
//! This crate implements the in-memory half of the storage engine:
//! a buffer pool that caches fixed-size disk pages in pinned frames,
//! backed by an extendible-hash page table and an LRU replacer.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Buffer pool, frames, and eviction
pub mod buffer;

/// Disk management and page I/O
pub mod disk;

/// Write-ahead log interface
pub mod log;
