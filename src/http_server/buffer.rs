//! Reusable scratch buffers for response bodies
//!
//! Bodies are encoded into a pooled buffer and then copied out at their exact
//! size, so the pool saves the growth of the encoding space, not the final
//! body allocation.
//!
//! A `PooledBuffer` owns its bytes while checked out and gives them back to
//! the pool when dropped, so every exit path of a handler releases it. Bytes
//! are cleared on the way back in; nothing written for one request is
//! visible to the next.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

/// Initial capacity of a freshly allocated buffer
pub const BUFFER_CAPACITY: usize = 1024;

/// Buffers that grew past this are dropped instead of pooled
pub const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// Upper bound on idle buffers kept by a pool
pub const MAX_POOLED_BUFFERS: usize = 64;

/// Concurrency-safe pool of byte buffers
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out an empty buffer
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(BUFFER_CAPACITY));
        debug_assert!(buf.is_empty());

        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Number of idle buffers
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < MAX_POOLED_BUFFERS {
            free.push(buf);
        }
    }
}

/// A buffer checked out of a [`BufferPool`]
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
