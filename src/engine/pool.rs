// src/engine/pool.rs
//
// Global thread pool for running queued pipeline jobs.
//
// One lazily built pool is shared by every workspace. The thread count is fixed on
// first use.

use rayon::ThreadPool;
use std::sync::OnceLock;

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_RAYON_THREADS: usize = 1;

/// Caps how many multi-megapixel buffers are alive at once
pub const MAX_POOL_THREADS: usize = 16;

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// Shared pool, or `None` if rayon could not spawn any threads.
/// Callers fall back to running jobs on the current thread.
pub fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let num_threads = pool_size();
            match rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("optiimage-worker-{i}"))
                .build()
            {
                Ok(pool) => {
                    tracing::debug!(num_threads, "created pipeline thread pool");
                    Some(pool)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to build thread pool, running jobs inline");
                    None
                }
            }
        })
        .as_ref()
}

/// Thread count derived from available parallelism (respects cgroup CPU quota).
pub fn pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_RAYON_THREADS)
        .clamp(MIN_RAYON_THREADS, MAX_POOL_THREADS)
}
