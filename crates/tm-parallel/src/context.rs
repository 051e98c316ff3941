use std::cell::UnsafeCell;
use std::fmt;

use crate::pool::ThreadPool;

/// Caller-allocated scratch memory shared by all threads of one parallel
/// region.
///
/// The kernel carves the buffer into per-thread or per-row spans; the
/// protocol (static partition or chunk claiming) guarantees the spans handed
/// out at any moment are disjoint, which is what makes the `Sync` impl sound.
/// Bytes live in `UnsafeCell`s so concurrent spans never alias a wider
/// mutable borrow.
pub struct WorkBuffer {
    data: Box<[UnsafeCell<u8>]>,
}

// Safety: interior access only happens through `span`/`as_slice`, whose
// contracts require disjoint mutable ranges across threads.
unsafe impl Sync for WorkBuffer {}

impl WorkBuffer {
    /// Allocate a zero-filled buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        WorkBuffer {
            data: (0..capacity).map(|_| UnsafeCell::new(0u8)).collect(),
        }
    }

    /// Byte capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the mutable bytes `[offset, offset + len)`.
    ///
    /// # Safety
    /// The caller must guarantee that no other thread accesses any byte in
    /// the range while the returned slice is live.
    ///
    /// # Panics
    /// Panics if the range exceeds the buffer capacity.
    pub unsafe fn span(&self, offset: usize, len: usize) -> &mut [u8] {
        assert!(
            offset + len <= self.data.len(),
            "work buffer span {}..{} exceeds capacity {}",
            offset,
            offset + len,
            self.data.len()
        );
        let base = self.data.as_ptr() as *mut u8;
        std::slice::from_raw_parts_mut(base.add(offset), len)
    }

    /// Returns the whole buffer as a shared slice.
    ///
    /// # Safety
    /// The caller must guarantee no thread mutates the buffer while the
    /// returned slice is live (in the kernel this holds between the barrier
    /// that ends the quantize phase and the end of the region).
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.data.as_ptr() as *const u8, self.data.len())
    }
}

impl fmt::Debug for WorkBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkBuffer")
            .field("capacity", &self.data.len())
            .finish()
    }
}

/// Per-thread invocation record handed to a kernel by the scheduler.
///
/// Owned by the caller for the duration of one kernel call and not retained
/// across calls. Mirrors the `(thread index, thread count, work buffer,
/// pool)` contract of the dispatch boundary.
#[derive(Debug, Clone, Copy)]
pub struct ComputeContext<'a> {
    /// 0-based index of this worker.
    pub thread_index: usize,
    /// Total number of workers in the region.
    pub thread_count: usize,
    /// Shared scratch memory for the invocation.
    pub work: &'a WorkBuffer,
    /// Shared pool state (barrier + chunk counter).
    pub pool: &'a ThreadPool,
}

impl<'a> ComputeContext<'a> {
    /// Build the context for worker `thread_index` of `pool`'s region.
    ///
    /// # Panics
    /// Panics if `thread_index` is out of range for the pool.
    pub fn new(thread_index: usize, work: &'a WorkBuffer, pool: &'a ThreadPool) -> Self {
        assert!(
            thread_index < pool.n_threads(),
            "thread index {} out of range for a pool of {}",
            thread_index,
            pool.n_threads()
        );
        ComputeContext {
            thread_index,
            thread_count: pool.n_threads(),
            work,
            pool,
        }
    }
}
