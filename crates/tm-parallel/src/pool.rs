use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// Shared state for one parallel region.
///
/// Holds the two primitives every accelerated kernel uses for work
/// distribution: a generation-counted barrier and an atomic chunk counter.
/// All `n_threads` workers of a region share one pool; its lifetime spans
/// exactly that region.
///
/// There is no cancellation or timeout: once a region starts, every thread
/// must reach the barrier or the pool is left inconsistent. That is a
/// documented limitation of this protocol, not something the pool detects.
#[derive(Debug)]
pub struct ThreadPool {
    n_threads: usize,
    chunk: AtomicUsize,
    barrier: Mutex<BarrierState>,
    cv: Condvar,
}

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

impl ThreadPool {
    /// Create the shared state for a region of `n_threads` workers.
    ///
    /// # Panics
    /// Panics if `n_threads == 0`.
    pub fn new(n_threads: usize) -> Self {
        assert!(n_threads >= 1, "a parallel region needs at least one thread");
        ThreadPool {
            n_threads,
            chunk: AtomicUsize::new(0),
            barrier: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Number of threads participating in this region.
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Reset the chunk counter for a new phase.
    ///
    /// Relaxed ordering suffices: phases are separated by [`ThreadPool::barrier`],
    /// which orders the store against every other thread's first claim.
    pub fn chunk_set(&self, value: usize) {
        self.chunk.store(value, Ordering::Relaxed);
    }

    /// Atomically claim `increment` units of work, returning the claimed
    /// starting index (the pre-increment counter value).
    ///
    /// Each index is handed to exactly one caller and assignment is
    /// monotonic and non-overlapping; no total ordering across threads is
    /// promised beyond that.
    pub fn chunk_add(&self, increment: usize) -> usize {
        self.chunk.fetch_add(increment, Ordering::Relaxed)
    }

    /// Block until all `n_threads` workers of the current phase have arrived,
    /// then release them together.
    ///
    /// The barrier is reusable: an internal generation counter advances on
    /// every release, so a thread looping back into the next phase is never
    /// conflated with one still waiting on the previous phase.
    ///
    /// Acts as a full ordering fence: writes performed by any thread before
    /// its arrival are visible to every thread after the barrier returns.
    pub fn barrier(&self) {
        if self.n_threads == 1 {
            return;
        }

        let mut state = self
            .barrier
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.n_threads {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cv.notify_all();
            return;
        }

        while state.generation == generation {
            state = self
                .cv
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Run `f(thread_index, &pool)` on `n_threads` scoped worker threads.
///
/// This is the driver the scheduler boundary and the tests use: it creates
/// the pool, spawns `n_threads - 1` workers, runs index 0 on the calling
/// thread, and joins before returning. Because the workers are scoped, every
/// write they made (through a barrier or not) is visible to the caller
/// afterwards.
pub fn parallel_region<F>(n_threads: usize, f: F)
where
    F: Fn(usize, &ThreadPool) + Sync,
{
    let pool = ThreadPool::new(n_threads);
    std::thread::scope(|s| {
        for i in 1..n_threads {
            let pool = &pool;
            let f = &f;
            s.spawn(move || f(i, pool));
        }
        f(0, &pool);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_chunk_add_returns_pre_increment() {
        let pool = ThreadPool::new(1);
        pool.chunk_set(5);
        assert_eq!(pool.chunk_add(1), 5);
        assert_eq!(pool.chunk_add(3), 6);
        assert_eq!(pool.chunk_add(1), 9);
    }

    #[test]
    fn test_chunk_claiming_is_a_bijection() {
        // The kernel protocol: counter seeded with n_threads, each thread's
        // first chunk is its own index, further chunks come from chunk_add(1).
        const N_CHUNKS: usize = 203;
        for n_threads in [1usize, 2, 3, 7] {
            let claimed = Mutex::new(Vec::new());
            parallel_region(n_threads, |ith, pool| {
                if ith == 0 {
                    pool.chunk_set(n_threads);
                }
                pool.barrier();

                let mut mine = Vec::new();
                let mut current = ith;
                while current < N_CHUNKS {
                    mine.push(current);
                    current = pool.chunk_add(1);
                }
                claimed.lock().unwrap().extend(mine);
            });

            let claimed = claimed.into_inner().unwrap();
            assert_eq!(claimed.len(), N_CHUNKS, "n_threads={}", n_threads);
            let unique: HashSet<usize> = claimed.iter().copied().collect();
            assert_eq!(unique.len(), N_CHUNKS, "duplicate claims");
            assert!(unique.iter().all(|&c| c < N_CHUNKS), "claim out of range");
        }
    }

    #[test]
    fn test_barrier_releases_only_after_all_arrive() {
        const N: usize = 4;
        let arrived = AtomicUsize::new(0);
        parallel_region(N, |ith, pool| {
            // Stagger arrivals so the last thread is genuinely late.
            std::thread::sleep(Duration::from_millis(10 * ith as u64));
            arrived.fetch_add(1, Ordering::SeqCst);
            pool.barrier();
            assert_eq!(arrived.load(Ordering::SeqCst), N);
        });
    }

    #[test]
    fn test_barrier_generation_isolation() {
        const N: usize = 3;
        let phase_one = AtomicUsize::new(0);
        let phase_two = AtomicUsize::new(0);
        parallel_region(N, |ith, pool| {
            phase_one.fetch_add(1, Ordering::SeqCst);
            pool.barrier();
            assert_eq!(phase_one.load(Ordering::SeqCst), N);

            // A fast thread re-entering the barrier must wait on the new
            // generation, not slip through the one just completed.
            if ith == 0 {
                std::thread::sleep(Duration::from_millis(20));
            }
            phase_two.fetch_add(1, Ordering::SeqCst);
            pool.barrier();
            assert_eq!(phase_two.load(Ordering::SeqCst), N);
        });
    }

    #[test]
    fn test_barrier_many_phases() {
        const N: usize = 4;
        const PHASES: usize = 50;
        let counter = AtomicUsize::new(0);
        parallel_region(N, |_ith, pool| {
            for phase in 1..=PHASES {
                counter.fetch_add(1, Ordering::SeqCst);
                pool.barrier();
                assert_eq!(counter.load(Ordering::SeqCst), phase * N);
                pool.barrier();
            }
        });
    }

    #[test]
    fn test_single_thread_barrier_is_noop() {
        let pool = ThreadPool::new(1);
        pool.barrier();
        pool.barrier();
    }

    #[test]
    #[should_panic]
    fn test_zero_threads_rejected() {
        ThreadPool::new(0);
    }
}
