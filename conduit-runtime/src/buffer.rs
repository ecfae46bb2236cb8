//! Fixed-size pooled buffers. `NetworkBufferPool` is the one
//! process-global pool; per-partition/gate `BufferPool`s lease a bounded
//! slice of it, the same way a single process-wide memory manager backs
//! per-shuffle buffer pools.

use bytes::BytesMut;
use conduit_core::error::{ConduitError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A single fixed-capacity buffer recycled back to its owning pool on drop.
pub struct Buffer {
    data: BytesMut,
    pool: Arc<PoolInner>,
}

impl Buffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.pool.recycle();
    }
}

struct PoolInner {
    buffer_size: usize,
    capacity: usize,
    available: AtomicUsize,
    notify: Notify,
}

impl PoolInner {
    fn recycle(&self) {
        self.available.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

/// Process-wide buffer pool ("NetworkBufferPool is process-global
/// and lock-protected"). Per-gate/partition `BufferPool`s are leased
/// segments of its total buffer count.
pub struct NetworkBufferPool {
    buffer_size: usize,
    total_buffers: usize,
    leased: Mutex<usize>,
}

impl NetworkBufferPool {
    pub fn new(buffer_size: usize, total_buffers: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer_size,
            total_buffers,
            leased: Mutex::new(0),
        })
    }

    /// Leases a local pool of up to `requested` buffers, failing if doing
    /// so would exceed the process-wide total ("lazily created
    /// from it").
    pub fn create_buffer_pool(self: &Arc<Self>, requested: usize) -> Result<BufferPool> {
        let mut leased = self.leased.lock();
        if *leased + requested > self.total_buffers {
            return Err(ConduitError::internal(format!(
                "network buffer pool exhausted: {} + {} > {}",
                *leased, requested, self.total_buffers
            )));
        }
        *leased += requested;
        Ok(BufferPool {
            inner: Arc::new(PoolInner {
                buffer_size: self.buffer_size,
                capacity: requested,
                available: AtomicUsize::new(requested),
                notify: Notify::new(),
            }),
            parent: self.clone(),
            leased: requested,
        })
    }

    fn release(&self, count: usize) {
        *self.leased.lock() -= count;
    }
}

/// A bounded pool of same-sized buffers backing one result partition or
/// input gate. `request_buffer` blocks, propagating backpressure, until a
/// buffer is recycled or the pool has spare unallocated capacity.
pub struct BufferPool {
    inner: Arc<PoolInner>,
    parent: Arc<NetworkBufferPool>,
    leased: usize,
}

impl BufferPool {
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn available(&self) -> usize {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Acquires a buffer, waiting for one to be recycled if the pool is
    /// currently exhausted. This is the natural backpressure point: a
    /// producer stalls here when downstream consumption lags.
    pub async fn request_buffer(&self) -> Buffer {
        loop {
            let prev = self.inner.available.load(Ordering::SeqCst);
            if prev > 0
                && self
                    .inner
                    .available
                    .compare_exchange(prev, prev - 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                return Buffer {
                    data: BytesMut::with_capacity(self.inner.buffer_size),
                    pool: self.inner.clone(),
                };
            }
            self.inner.notify.notified().await;
        }
    }

    /// Non-blocking variant used by code that must not suspend (e.g. a
    /// mailbox default action checking whether output is currently
    /// possible before committing to emit).
    pub fn try_request_buffer(&self) -> Option<Buffer> {
        loop {
            let prev = self.inner.available.load(Ordering::SeqCst);
            if prev == 0 {
                return None;
            }
            if self
                .inner
                .available
                .compare_exchange(prev, prev - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Some(Buffer {
                    data: BytesMut::with_capacity(self.inner.buffer_size),
                    pool: self.inner.clone(),
                });
            }
        }
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        self.parent.release(self.leased);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn request_buffer_respects_capacity() {
        let network_pool = NetworkBufferPool::new(1024, 4);
        let pool = network_pool.create_buffer_pool(2).unwrap();
        assert_eq!(pool.available(), 2);
        let a = pool.request_buffer().await;
        let b = pool.try_request_buffer();
        assert!(b.is_some());
        assert!(pool.try_request_buffer().is_none());
        drop(a);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn create_buffer_pool_rejects_over_subscription() {
        let network_pool = NetworkBufferPool::new(1024, 4);
        assert!(network_pool.create_buffer_pool(2).is_ok());
        assert!(network_pool.create_buffer_pool(3).is_err());
    }
}
