//! Extendible hash table with dynamic directory growth.
//!
//! The table keeps a directory of 2^G bucket handles, where G is the
//! global depth. A key is addressed by the low G bits of its hash.
//! Several directory entries may share one bucket; a bucket with local
//! depth L is shared by exactly the entries that agree on their low L
//! bits. When a bucket overflows it is split into two buckets of depth
//! L + 1, doubling the directory first if L == G. Buckets are never
//! merged and the directory never shrinks.

use std::hash::{BuildHasher, Hash, Hasher};

use parking_lot::Mutex;
use siphasher::sip::SipHasher13;

/// Default build hasher for the table.
///
/// Produces a fixed-key [`SipHasher13`], so hash values are stable across
/// runs and processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHashBuilder;

impl BuildHasher for DefaultHashBuilder {
    type Hasher = SipHasher13;

    fn build_hasher(&self) -> SipHasher13 {
        SipHasher13::new_with_keys(0x517c_c1b7_2722_0a95, 0x0fc9_4dc6_e6eb_8a5f)
    }
}

/// One key/value entry, stored with its full hash so splits never rehash.
struct Entry<K, V> {
    hash: u64,
    key: K,
    value: V,
}

struct Bucket<K, V> {
    local_depth: usize,
    entries: Vec<Entry<K, V>>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: usize, capacity: usize) -> Self {
        Self {
            local_depth,
            entries: Vec::with_capacity(capacity),
        }
    }
}

/// Directory state, guarded by the table mutex.
struct Directory<K, V> {
    global_depth: usize,
    bucket_capacity: usize,
    /// Directory entries are handles (indices) into `buckets`.
    dir: Vec<usize>,
    /// Bucket slab. Splits reuse the split bucket's slot for the "zero"
    /// half and push the "one" half, so `buckets.len()` is the live count.
    buckets: Vec<Bucket<K, V>>,
    len: usize,
}

impl<K, V> Directory<K, V> {
    fn index_of(&self, hash: u64) -> usize {
        let mask = (1u64 << self.global_depth) - 1;
        (hash & mask) as usize
    }
}

/// A concurrency-safe extendible hash table.
///
/// All operations are linearizable with respect to each other: a single
/// exclusive mutex guards the directory and every bucket. Insertion never
/// fails; the directory grows as needed.
///
/// The hasher is a type parameter so callers (and tests) can substitute a
/// controlled hash; the default is deterministic SipHash-1-3.
///
/// # Example
///
/// ```rust
/// use vesper_hash::ExtendibleHashTable;
///
/// let table = ExtendibleHashTable::new(2);
/// table.insert(1, "one");
/// table.insert(1, "uno"); // upsert
/// assert_eq!(table.get(&1), Some("uno"));
/// assert!(table.remove(&1));
/// ```
pub struct ExtendibleHashTable<K, V, S = DefaultHashBuilder> {
    inner: Mutex<Directory<K, V>>,
    hasher: S,
}

impl<K: Hash + Eq, V: Clone> ExtendibleHashTable<K, V, DefaultHashBuilder> {
    /// Creates a table whose buckets hold at most `bucket_capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_capacity` is zero.
    pub fn new(bucket_capacity: usize) -> Self {
        Self::with_hasher(bucket_capacity, DefaultHashBuilder)
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    V: Clone,
    S: BuildHasher,
{
    /// Creates a table with a caller-supplied build hasher.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_capacity` is zero.
    pub fn with_hasher(bucket_capacity: usize, hasher: S) -> Self {
        assert!(bucket_capacity > 0, "bucket capacity must be positive");
        let inner = Directory {
            global_depth: 0,
            bucket_capacity,
            dir: vec![0],
            buckets: vec![Bucket::new(0, bucket_capacity)],
            len: 0,
        };
        Self {
            inner: Mutex::new(inner),
            hasher,
        }
    }

    fn hash_key(&self, key: &K) -> u64 {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns a clone of the value stored under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        let hash = self.hash_key(key);
        let inner = self.inner.lock();
        let slot = inner.dir[inner.index_of(hash)];
        inner.buckets[slot]
            .entries
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| entry.value.clone())
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        let hash = self.hash_key(key);
        let inner = self.inner.lock();
        let slot = inner.dir[inner.index_of(hash)];
        inner.buckets[slot]
            .entries
            .iter()
            .any(|entry| &entry.key == key)
    }

    /// Inserts `value` under `key`, overwriting any existing value.
    ///
    /// An existing key is updated in place without splitting. A new key
    /// whose target bucket is full triggers one or more splits until the
    /// bucket addressed by the key has room.
    pub fn insert(&self, key: K, value: V) {
        let hash = self.hash_key(&key);
        let mut inner = self.inner.lock();

        let slot = inner.dir[inner.index_of(hash)];
        if let Some(entry) = inner.buckets[slot]
            .entries
            .iter_mut()
            .find(|entry| entry.key == key)
        {
            entry.value = value;
            return;
        }

        let mut slot = slot;
        while inner.buckets[slot].entries.len() >= inner.bucket_capacity {
            Self::split(&mut inner, slot);
            slot = inner.dir[inner.index_of(hash)];
        }
        inner.buckets[slot].entries.push(Entry { hash, key, value });
        inner.len += 1;
    }

    /// Removes `key` from the table. Returns true iff it was present.
    ///
    /// Buckets are never merged and the directory never shrinks.
    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hash_key(key);
        let mut inner = self.inner.lock();
        let slot = inner.dir[inner.index_of(hash)];
        let pos = inner.buckets[slot]
            .entries
            .iter()
            .position(|entry| &entry.key == key);
        match pos {
            Some(pos) => {
                inner.buckets[slot].entries.remove(pos);
                inner.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Splits the bucket in slab slot `target`.
    ///
    /// The "zero" half reuses the split bucket's slot, the "one" half is
    /// appended to the slab, and every directory entry that pointed at the
    /// split bucket is redirected by its bit at `1 << local_depth`.
    fn split(inner: &mut Directory<K, V>, target: usize) {
        let local_depth = inner.buckets[target].local_depth;
        if local_depth == inner.global_depth {
            // Double the directory: entry i + 2^G starts as an alias of
            // entry i.
            let len = inner.dir.len();
            inner.dir.reserve(len);
            inner.dir.extend_from_within(..);
            inner.global_depth += 1;
        }

        let mask = 1u64 << local_depth;
        let capacity = inner.bucket_capacity;
        let mut zero = Bucket::new(local_depth + 1, capacity);
        let mut one = Bucket::new(local_depth + 1, capacity);
        for entry in inner.buckets[target].entries.drain(..) {
            if entry.hash & mask == 0 {
                zero.entries.push(entry);
            } else {
                one.entries.push(entry);
            }
        }
        inner.buckets[target] = zero;
        let one_slot = inner.buckets.len();
        inner.buckets.push(one);

        for (i, slot) in inner.dir.iter_mut().enumerate() {
            if *slot == target && (i as u64) & mask != 0 {
                *slot = one_slot;
            }
        }
    }

    /// Returns the global depth G. The directory holds 2^G entries.
    pub fn global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    /// Returns the number of live buckets.
    pub fn num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// Returns the local depth of the bucket at directory index
    /// `bucket_index`, or `None` if that bucket is empty or the index is
    /// out of range.
    pub fn local_depth(&self, bucket_index: usize) -> Option<usize> {
        let inner = self.inner.lock();
        let slot = *inner.dir.get(bucket_index)?;
        let bucket = &inner.buckets[slot];
        if bucket.entries.is_empty() {
            None
        } else {
            Some(bucket.local_depth)
        }
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Asserts the directory structure invariants. Test support.
    #[cfg(test)]
    fn check_directory(&self) {
        let inner = self.inner.lock();
        assert_eq!(inner.dir.len(), 1 << inner.global_depth);
        for &slot in &inner.dir {
            assert!(inner.buckets[slot].local_depth <= inner.global_depth);
        }
        // Entries i and j share a bucket iff they agree on the bucket's
        // low local_depth bits.
        for (i, &slot_i) in inner.dir.iter().enumerate() {
            let local_mask = (1u64 << inner.buckets[slot_i].local_depth) - 1;
            for (j, &slot_j) in inner.dir.iter().enumerate() {
                let agree = (i as u64) & local_mask == (j as u64) & local_mask;
                assert_eq!(slot_i == slot_j, agree, "directory aliasing broken at ({i}, {j})");
            }
        }
        // Every entry lives in the bucket its hash addresses.
        for &slot in &inner.dir {
            for entry in &inner.buckets[slot].entries {
                assert_eq!(inner.dir[inner.index_of(entry.hash)], slot);
            }
        }
    }
}

impl<K, V, S> std::fmt::Debug for ExtendibleHashTable<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ExtendibleHashTable")
            .field("global_depth", &inner.global_depth)
            .field("num_buckets", &inner.buckets.len())
            .field("len", &inner.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::hash::Hasher;
    use std::sync::Arc;

    use rand::prelude::*;

    use super::*;

    /// Test hasher: the hash of a u64 key is the key itself.
    #[derive(Default)]
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for &byte in bytes {
                self.0 = (self.0 << 8) | u64::from(byte);
            }
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct IdentityBuild;

    impl BuildHasher for IdentityBuild {
        type Hasher = IdentityHasher;

        fn build_hasher(&self) -> IdentityHasher {
            IdentityHasher::default()
        }
    }

    fn identity_table(bucket_capacity: usize) -> ExtendibleHashTable<u64, u64, IdentityBuild> {
        ExtendibleHashTable::with_hasher(bucket_capacity, IdentityBuild)
    }

    #[test]
    fn test_initial_state() {
        let table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(4);
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.num_buckets(), 1);
        assert_eq!(table.len(), 0);
        assert!(table.is_empty());
        assert_eq!(table.local_depth(0), None);
    }

    #[test]
    #[should_panic(expected = "bucket capacity must be positive")]
    fn test_zero_capacity_panics() {
        let _table: ExtendibleHashTable<u64, u64> = ExtendibleHashTable::new(0);
    }

    #[test]
    fn test_insert_and_get() {
        let table = ExtendibleHashTable::new(4);
        table.insert("a", 1);
        table.insert("b", 2);

        assert_eq!(table.get(&"a"), Some(1));
        assert_eq!(table.get(&"b"), Some(2));
        assert_eq!(table.get(&"c"), None);
        assert!(table.contains(&"a"));
        assert!(!table.contains(&"c"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_upsert_overwrites_without_split() {
        let table = identity_table(2);
        table.insert(0, 10);
        table.insert(2, 20);
        // Bucket is full; updating an existing key must not split.
        table.insert(0, 11);

        assert_eq!(table.get(&0), Some(11));
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.num_buckets(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_remove() {
        let table = ExtendibleHashTable::new(4);
        table.insert("a", 1);

        assert!(table.remove(&"a"));
        assert!(!table.remove(&"a"));
        assert_eq!(table.get(&"a"), None);
        assert_eq!(table.len(), 0);
        // Removal never shrinks the directory.
        assert_eq!(table.num_buckets(), 1);
    }

    #[test]
    fn test_overflow_splits_bucket() {
        // Keys hash to 0b00, 0b10, 0b01; capacity 2. The third insert
        // splits on bit 0 and doubles the directory.
        let table = identity_table(2);
        table.insert(0b00, 100);
        table.insert(0b10, 101);
        table.insert(0b01, 102);

        assert!(table.global_depth() >= 1);
        assert_eq!(table.num_buckets(), 2);
        assert_eq!(table.get(&0b00), Some(100));
        assert_eq!(table.get(&0b10), Some(101));
        assert_eq!(table.get(&0b01), Some(102));
        table.check_directory();
    }

    #[test]
    fn test_repeated_split_on_shared_low_bits() {
        // 0, 4, 8 agree on their low two bits, so a single insert has to
        // split repeatedly until bit 2 separates them.
        let table = identity_table(2);
        table.insert(0, 0);
        table.insert(4, 4);
        table.insert(8, 8);

        assert_eq!(table.global_depth(), 3);
        for key in [0u64, 4, 8] {
            assert_eq!(table.get(&key), Some(key));
        }
        table.check_directory();
    }

    #[test]
    fn test_local_depth_probe() {
        let table = identity_table(2);
        table.insert(0b00, 0);
        table.insert(0b10, 0);
        table.insert(0b01, 0);

        // Directory has two entries after the split; both buckets hold
        // entries, at local depth 1.
        assert_eq!(table.local_depth(0), Some(1));
        assert_eq!(table.local_depth(1), Some(1));
        assert_eq!(table.local_depth(2), None);
    }

    #[test]
    fn test_local_depth_none_for_empty_bucket() {
        let table = identity_table(1);
        table.insert(0, 0);
        table.insert(1, 1);
        table.remove(&1);

        assert_eq!(table.local_depth(0), Some(1));
        assert_eq!(table.local_depth(1), None);
    }

    #[test]
    fn test_split_counts() {
        let table = identity_table(1);
        for key in 0..8u64 {
            table.insert(key, key);
        }
        // Capacity-one buckets end up fully separated: one bucket per
        // directory entry.
        assert_eq!(table.global_depth(), 3);
        assert_eq!(table.num_buckets(), 8);
        assert_eq!(table.len(), 8);
        table.check_directory();
    }

    #[test]
    fn test_directory_growth_with_default_hasher() {
        let table = ExtendibleHashTable::new(4);
        for i in 0..1024u64 {
            table.insert(i, i * 2);
        }
        assert_eq!(table.len(), 1024);
        for i in 0..1024u64 {
            assert_eq!(table.get(&i), Some(i * 2));
        }
        assert!(table.global_depth() > 0);
        table.check_directory();
    }

    #[test]
    fn test_randomized_against_model() {
        let mut rng = StdRng::seed_from_u64(0xdecade);
        let table = ExtendibleHashTable::new(4);
        let mut model: HashMap<u64, u64> = HashMap::new();

        for _ in 0..4096 {
            let key = rng.gen_range(0..512);
            match rng.gen_range(0..3) {
                0 => {
                    let value = rng.gen();
                    table.insert(key, value);
                    model.insert(key, value);
                }
                1 => {
                    assert_eq!(table.remove(&key), model.remove(&key).is_some());
                }
                _ => {
                    assert_eq!(table.get(&key), model.get(&key).copied());
                }
            }
        }

        assert_eq!(table.len(), model.len());
        for (key, value) in &model {
            assert_eq!(table.get(key), Some(*value));
        }
        table.check_directory();
    }

    #[test]
    fn test_concurrent_inserts() {
        let table = Arc::new(ExtendibleHashTable::new(4));
        let mut handles = Vec::new();

        for t in 0..4u64 {
            let table = Arc::clone(&table);
            handles.push(std::thread::spawn(move || {
                for i in 0..256u64 {
                    table.insert(t * 1000 + i, i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.len(), 4 * 256);
        for t in 0..4u64 {
            for i in 0..256u64 {
                assert_eq!(table.get(&(t * 1000 + i)), Some(i));
            }
        }
    }
}
