//! Reusable scratch buffers.
//!
//! Every icon needs a couple of supersampled byte planes (the ink mask and
//! the flood-fill scratch). Across thousands of icons that is a lot of
//! large allocations, so finished tasks hand their planes back to a
//! [`BufferPool`] and later tasks pick them up again.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// PixelBuffer
// ============================================================================

/// A fixed-shape, row-major byte plane.
///
/// A buffer is owned by exactly one task at a time; it moves into the task
/// on [`BufferPool::acquire`] and back on [`BufferPool::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocates a zero-filled buffer.
    pub fn zeroed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub(crate) fn from_parts(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns `(width, height)`.
    pub fn shape(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.data
    }

    fn clear(&mut self) {
        self.data.fill(0);
    }
}

// ============================================================================
// BufferPool
// ============================================================================

/// Allocation counters for a [`BufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Buffers handed out from the free-list.
    pub reused: usize,
    /// Buffers that had to be freshly allocated.
    pub allocated: usize,
    /// Buffers currently parked in the free-list.
    pub idle: usize,
}

/// A bounded free-list of [`PixelBuffer`]s.
///
/// Running out of pooled buffers is never an error: `acquire` simply
/// allocates a new one.
pub struct BufferPool {
    free: Mutex<Vec<PixelBuffer>>,
    capacity: usize,
    reused: AtomicUsize,
    allocated: AtomicUsize,
}

impl BufferPool {
    /// Creates an empty pool that parks at most `capacity` buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            reused: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a zero-filled buffer of the requested shape.
    pub fn acquire(&self, width: u32, height: u32) -> PixelBuffer {
        let recycled = {
            let mut free = self.free.lock();
            free.iter()
                .position(|buf| buf.shape() == (width, height))
                .map(|idx| free.swap_remove(idx))
        };

        match recycled {
            Some(mut buf) => {
                buf.clear();
                self.reused.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                PixelBuffer::zeroed(width, height)
            }
        }
    }

    /// Hands a buffer back. Dropped if the free-list is already full.
    pub fn release(&self, buf: PixelBuffer) {
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(buf);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            reused: self.reused.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            idle: self.free.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_allocates_when_empty() {
        let pool = BufferPool::new(4);
        let buf = pool.acquire(8, 8);
        assert_eq!(buf.shape(), (8, 8));
        assert!(buf.as_slice().iter().all(|&v| v == 0));
        assert_eq!(pool.stats().allocated, 1);
        assert_eq!(pool.stats().reused, 0);
    }

    #[test]
    fn released_buffer_is_reused_and_zeroed() {
        let pool = BufferPool::new(4);
        let mut buf = pool.acquire(4, 4);
        buf.as_mut_slice().fill(0xAB);
        pool.release(buf);

        let again = pool.acquire(4, 4);
        assert!(again.as_slice().iter().all(|&v| v == 0), "stale data leaked");
        assert_eq!(pool.stats().reused, 1);
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn shape_mismatch_falls_back_to_allocation() {
        let pool = BufferPool::new(4);
        pool.release(PixelBuffer::zeroed(4, 4));

        let other = pool.acquire(6, 6);
        assert_eq!(other.shape(), (6, 6));
        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.reused, 0);
        assert_eq!(stats.idle, 1, "mismatched buffer stays parked");
    }

    #[test]
    fn release_beyond_capacity_drops() {
        let pool = BufferPool::new(2);
        for _ in 0..5 {
            pool.release(PixelBuffer::zeroed(2, 2));
        }
        assert_eq!(pool.stats().idle, 2);
    }
}
