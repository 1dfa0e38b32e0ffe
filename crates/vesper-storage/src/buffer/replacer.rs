//! LRU replacement policy for the buffer pool.
//!
//! The replacer tracks eviction candidates: frames that hold a page but
//! are not pinned by anyone. It keeps them in recency order with a
//! doubly-linked list and a map from value to node for O(1) touch,
//! victim, and erase.

use std::collections::HashMap;
use std::hash::Hash;
use std::ptr::NonNull;

use parking_lot::Mutex;

/// A node in the recency list.
struct Node<T> {
    value: T,
    prev: Option<NonNull<Node<T>>>,
    next: Option<NonNull<Node<T>>>,
}

/// List and map state, guarded by the replacer mutex.
struct ReplacerInner<T> {
    map: HashMap<T, NonNull<Node<T>>>,
    /// Most recently used end.
    head: Option<NonNull<Node<T>>>,
    /// Least recently used end; victims come from here.
    tail: Option<NonNull<Node<T>>>,
}

impl<T> ReplacerInner<T> {
    /// Pushes a detached node to the MRU end.
    fn push_front(&mut self, node_ptr: NonNull<Node<T>>) {
        unsafe {
            (*node_ptr.as_ptr()).prev = None;
            (*node_ptr.as_ptr()).next = self.head;

            if let Some(head) = self.head {
                (*head.as_ptr()).prev = Some(node_ptr);
            }
            self.head = Some(node_ptr);

            if self.tail.is_none() {
                self.tail = Some(node_ptr);
            }
        }
    }

    /// Unlinks a node from the list without freeing it.
    fn unlink(&mut self, node_ptr: NonNull<Node<T>>) {
        unsafe {
            let prev = (*node_ptr.as_ptr()).prev;
            let next = (*node_ptr.as_ptr()).next;

            match prev {
                Some(prev) => (*prev.as_ptr()).next = next,
                None => self.head = next,
            }
            match next {
                Some(next) => (*next.as_ptr()).prev = prev,
                None => self.tail = prev,
            }
        }
    }
}

/// An LRU store of eviction candidates.
///
/// `victim` yields values in the order they were last inserted, oldest
/// first; re-inserting a present value refreshes its position. All
/// operations run under a single mutex and are O(1).
///
/// # Example
///
/// ```rust
/// use vesper_storage::buffer::LruReplacer;
///
/// let replacer = LruReplacer::new();
/// replacer.insert(1);
/// replacer.insert(2);
/// assert_eq!(replacer.victim(), Some(1));
/// ```
pub struct LruReplacer<T> {
    inner: Mutex<ReplacerInner<T>>,
}

// Safety: the nodes are reachable only through `inner`, and the mutex
// serializes every access to them.
unsafe impl<T: Send> Send for LruReplacer<T> {}
unsafe impl<T: Send> Sync for LruReplacer<T> {}

impl<T: Hash + Eq + Copy> LruReplacer<T> {
    /// Creates an empty replacer.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ReplacerInner {
                map: HashMap::new(),
                head: None,
                tail: None,
            }),
        }
    }

    /// Records `value` as most recently used.
    ///
    /// An absent value is added; a present value is moved to the
    /// most-recently-used position. Size grows only on the absent branch.
    pub fn insert(&self, value: T) {
        let mut inner = self.inner.lock();

        if let Some(&node_ptr) = inner.map.get(&value) {
            if inner.head != Some(node_ptr) {
                inner.unlink(node_ptr);
                inner.push_front(node_ptr);
            }
            return;
        }

        let node = Box::new(Node {
            value,
            prev: None,
            next: None,
        });
        let node_ptr = NonNull::from(Box::leak(node));
        inner.push_front(node_ptr);
        inner.map.insert(value, node_ptr);
    }

    /// Removes and returns the least recently used value.
    pub fn victim(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let tail = inner.tail?;
        inner.unlink(tail);
        // Safety: the node came out of the list and is no longer
        // reachable; we own it now.
        let node = unsafe { Box::from_raw(tail.as_ptr()) };
        inner.map.remove(&node.value);
        Some(node.value)
    }

    /// Removes `value` if present. Returns true iff it was present.
    pub fn erase(&self, value: T) -> bool {
        let mut inner = self.inner.lock();
        match inner.map.remove(&value) {
            Some(node_ptr) => {
                inner.unlink(node_ptr);
                // Safety: removed from map and list; we own the node.
                drop(unsafe { Box::from_raw(node_ptr.as_ptr()) });
                true
            }
            None => false,
        }
    }

    /// Returns true if `value` is currently tracked.
    pub fn contains(&self, value: T) -> bool {
        self.inner.lock().map.contains_key(&value)
    }

    /// Returns the number of tracked values.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Returns true if no values are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Hash + Eq + Copy> Default for LruReplacer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LruReplacer<T> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let mut current = inner.head;
        while let Some(node_ptr) = current {
            unsafe {
                current = (*node_ptr.as_ptr()).next;
                drop(Box::from_raw(node_ptr.as_ptr()));
            }
        }
    }
}

impl<T: Hash + Eq + Copy + std::fmt::Debug> std::fmt::Debug for LruReplacer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruReplacer")
            .field("len", &self.len())
            .finish()
    }
}
