//! In-memory extendible hashing for VesperDB.
//!
//! This crate provides [`ExtendibleHashTable`], a concurrency-safe
//! associative map whose directory grows dynamically as buckets overflow.
//! The buffer pool uses it as its page table; it is equally usable as a
//! general-purpose in-memory map.
//!
//! # Example
//!
//! ```rust
//! use vesper_hash::ExtendibleHashTable;
//!
//! let table = ExtendibleHashTable::new(4);
//! table.insert("key1", "value1");
//! assert_eq!(table.get(&"key1"), Some("value1"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod extendible;

pub use extendible::{DefaultHashBuilder, ExtendibleHashTable};

/// Default bucket capacity when not specified.
pub const DEFAULT_BUCKET_CAPACITY: usize = 50;
