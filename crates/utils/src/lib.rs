#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

// Re-export spin crate types as our lock API
// Note: spin::Mutex is re-exported as Mutex for API compatibility
pub use spin::{Barrier, Lazy, Once};
pub use spin::{Mutex, MutexGuard};
pub use spin::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// Re-export hashbrown collections
pub use hashbrown::{HashMap, HashSet};

/// Fixed-capacity FIFO ring buffer.
///
/// Overwrites nothing: `push` reports failure when the buffer is full so the
/// caller can decide whether to drop the oldest entry first. The kernel log
/// sink uses this for the last-log record store.
pub struct RingBuffer<T: Copy, const N: usize> {
    buffer: [T; N],
    head: usize,
    tail: usize,
    full: bool,
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    #[must_use]
    pub const fn new(default_val: T) -> Self {
        Self {
            buffer: [default_val; N],
            head: 0,
            tail: 0,
            full: false,
        }
    }

    /// Push an element; returns false when the buffer is full.
    pub fn push(&mut self, item: T) -> bool {
        if self.full {
            return false;
        }

        self.buffer[self.head] = item;
        self.head = (self.head + 1) % N; // wrap around
        self.full = self.head == self.tail;
        true
    }

    /// Pop the oldest element (FIFO); `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        if !self.full && self.head == self.tail {
            return None;
        }

        let item = self.buffer[self.tail];
        self.tail = (self.tail + 1) % N; // wrap around
        self.full = false;
        Some(item)
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.head == self.tail
    }

    /// Number of elements currently stored.
    pub fn len(&self) -> usize {
        if self.full {
            N
        } else {
            (self.head + N - self.tail) % N
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_spinlock_basic() {
        let lock = Mutex::new(42);
        {
            let mut guard = lock.lock();
            assert_eq!(*guard, 42);
            *guard = 43;
        } // release on drop
        assert_eq!(*lock.lock(), 43);
    }

    #[test]
    fn test_spinlock_blocking() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let lock = Arc::new(Mutex::new(()));
        let lock_clone = lock.clone();

        let start = std::time::Instant::now();

        // Thread takes lock and holds it for 100ms
        let h = thread::spawn(move || {
            let _g = lock_clone.lock();
            thread::sleep(Duration::from_millis(100));
        });

        // Give thread time to acquire
        thread::sleep(Duration::from_millis(10));

        // This should block until the thread releases
        let _g = lock.lock();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));

        h.join().unwrap();
    }

    #[test]
    fn test_ring_buffer_fifo() {
        let mut rb = RingBuffer::<u8, 4>::new(0);
        assert!(rb.is_empty());
        assert_eq!(rb.len(), 0);

        assert!(rb.push(1));
        assert!(rb.push(2));
        assert!(rb.push(3));
        assert!(rb.push(4));
        assert!(!rb.push(5)); // full returns false
        assert_eq!(rb.len(), 4);

        assert_eq!(rb.pop(), Some(1)); // FIFO order
        assert_eq!(rb.pop(), Some(2));
        assert_eq!(rb.pop(), Some(3));
        assert_eq!(rb.pop(), Some(4));
        assert_eq!(rb.pop(), None); // empty returns None
        assert!(rb.is_empty());
    }

    #[test]
    fn test_ring_buffer_wrap_around() {
        let mut rb = RingBuffer::<u8, 2>::new(0);
        rb.push(1);
        rb.push(2);
        rb.pop();
        rb.push(3); // wraps around
        assert_eq!(rb.len(), 2);
        assert_eq!(rb.pop(), Some(2));
        assert_eq!(rb.pop(), Some(3));
        assert!(rb.is_empty());
    }

    #[test]
    fn test_hashmap_basic() {
        let mut map = HashMap::new();
        map.insert(1, "one");
        map.insert(2, "two");
        assert_eq!(map.get(&1), Some(&"one"));
        assert_eq!(map.get(&3), None);
    }
}
