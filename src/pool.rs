//! Free-list pools for per-request objects.
//!
//! A [`Pool`] hands out owned values and takes them back. `acquire` pops an
//! idle value or lazily builds a new one; `release` pushes it back unless the
//! pool already holds `max_idle` values, in which case the value is dropped.
//!
//! Ownership does the bookkeeping: `release` consumes the value, so a caller
//! cannot keep using it after handing it back. Resetting a value before it is
//! released is the caller's job ([`BufferPool`] does it for buffers, the
//! dispatcher does it for contexts).

use bytes::BytesMut;
use parking_lot::Mutex;

/// A concurrency-safe free-list.
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
    new: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> Pool<T> {
    pub fn new(max_idle: usize, new: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self { idle: Mutex::new(Vec::new()), max_idle, new: Box::new(new) }
    }

    /// Pops an idle value, or builds one if the pool is empty.
    pub fn acquire(&self) -> T {
        // Pop under the lock, construct outside it.
        let reused = self.idle.lock().pop();
        reused.unwrap_or_else(|| (self.new)())
    }

    /// Returns a value to the pool.
    pub fn release(&self, value: T) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(value);
        }
    }

    /// Number of values currently waiting to be reused.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

// ── Buffers ───────────────────────────────────────────────────────────────────

/// Default capacity of a freshly built serialization buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 2048;

/// A pool of `BytesMut` buffers used while rendering responses.
pub struct BufferPool {
    inner: Pool<BytesMut>,
}

impl BufferPool {
    pub fn new(capacity: usize, max_idle: usize) -> Self {
        Self { inner: Pool::new(max_idle, move || BytesMut::with_capacity(capacity)) }
    }

    pub fn acquire(&self) -> BytesMut {
        self.inner.acquire()
    }

    /// Clears `buf` and returns it to the pool.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        self.inner.release(buf);
    }

    pub fn idle(&self) -> usize {
        self.inner.idle()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, 1024)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_acquire_builds_lazily() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let pool = Pool::new(4, move || counter.fetch_add(1, Ordering::SeqCst));

        assert_eq!(built.load(Ordering::SeqCst), 0);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!((a, b), (0, 1));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_release_then_reuse() {
        let pool = Pool::new(4, Vec::<u8>::new);
        let mut v = pool.acquire();
        v.reserve(128);
        let cap = v.capacity();
        pool.release(v);
        assert_eq!(pool.idle(), 1);

        let v = pool.acquire();
        assert_eq!(v.capacity(), cap);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_max_idle_drops_extra() {
        let pool = Pool::new(1, || 0u8);
        pool.release(1);
        pool.release(2);
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.acquire(), 1);
    }

    #[test]
    fn test_buffer_release_clears() {
        let pool = BufferPool::new(64, 8);
        let mut buf = pool.acquire();
        assert!(buf.capacity() >= 64);
        buf.extend_from_slice(b"stale bytes");
        pool.release(buf);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 64);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = Arc::new(BufferPool::new(16, 64));
        std::thread::scope(|s| {
            for _ in 0..8 {
                let pool = Arc::clone(&pool);
                s.spawn(move || {
                    for i in 0..200u32 {
                        let mut buf = pool.acquire();
                        assert!(buf.is_empty());
                        buf.extend_from_slice(&i.to_be_bytes());
                        pool.release(buf);
                    }
                });
            }
        });
        assert!(pool.idle() <= 8);
    }
}
