//! Read buffer pool.
//!
//! Every connection leases one fixed-capacity read buffer for its whole
//! lifetime and returns it on close. Pooling keeps the hot accept path free
//! of per-connection allocation; when the pool runs dry a fresh buffer is
//! allocated instead of refusing the connection.

use bytes::BytesMut;
use std::sync::Mutex;

/// Pool of reusable read buffers.
///
/// `acquire` never blocks and never fails: an empty pool falls back to a
/// fresh allocation. `release` recycles up to the pool's original size and
/// lets the rest drop.
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    buffer_size: usize,
    max_pooled: usize,
}

impl BufferPool {
    /// Create a pool with `count` pre-allocated buffers of `buffer_size` bytes.
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let mut free = Vec::with_capacity(count);
        for _ in 0..count {
            free.push(BytesMut::with_capacity(buffer_size));
        }

        Self {
            free: Mutex::new(free),
            buffer_size,
            max_pooled: count,
        }
    }

    /// Take a buffer from the pool, allocating if none are available.
    pub fn acquire(&self) -> BytesMut {
        self.free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_size))
    }

    /// Return a buffer to the pool.
    ///
    /// The buffer is cleared first; its capacity is retained for the next
    /// connection. Buffers beyond the pool's original size are dropped.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let mut free = self.free.lock().unwrap();
        if free.len() < self.max_pooled {
            free.push(buf);
        }
    }

    /// Capacity of each pooled buffer.
    #[allow(dead_code)]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of buffers currently available.
    #[allow(dead_code)]
    pub fn available(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_recycles() {
        let pool = BufferPool::new(2, 4096);
        assert_eq!(pool.available(), 2);

        let mut a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.available(), 0);

        a.extend_from_slice(b"leftover request bytes");
        pool.release(a);
        assert_eq!(pool.available(), 1);

        // Recycled buffer comes back cleared with its capacity intact.
        let a = pool.acquire();
        assert!(a.is_empty());
        assert!(a.capacity() >= 4096);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn empty_pool_allocates_fresh() {
        let pool = BufferPool::new(1, 1024);
        let a = pool.acquire();
        let b = pool.acquire();
        assert!(b.capacity() >= 1024);

        // Releasing both only keeps one: the pool never grows past its
        // original size.
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), 1);
    }
}
