// src/engine/pool.rs
//
// Thread pools, built lazily on first use and reused for the life of the
// process:
//
// - the shared pool runs off-thread `process_async` calls;
// - the batch pool has exactly BATCH_CONCURRENCY threads, so a batch chunk
//   can never run wider than that no matter how rayon splits the work.
//
// Pool construction failure is not fatal: callers receive `None` and run the
// work on the calling thread instead.

use rayon::ThreadPool;
use std::sync::OnceLock;
use tracing::warn;

/// Files processed concurrently inside one batch chunk.
pub const BATCH_CONCURRENCY: usize = 3;

/// Minimum number of rayon threads to ensure at least some parallelism
const MIN_RAYON_THREADS: usize = 1;

static SHARED_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();
static BATCH_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

fn build_pool(name: &'static str, threads: usize) -> Option<ThreadPool> {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("pixel-press-{name}-{i}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(target: "pixel_press::batch", pool = name, error = %e, "thread pool unavailable");
            None
        }
    }
}

/// Pool sized to the available parallelism.
pub fn shared_pool() -> Option<&'static ThreadPool> {
    SHARED_POOL
        .get_or_init(|| {
            let threads = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_RAYON_THREADS)
                .max(MIN_RAYON_THREADS);
            build_pool("shared", threads)
        })
        .as_ref()
}

/// Pool with exactly `BATCH_CONCURRENCY` workers.
pub fn batch_pool() -> Option<&'static ThreadPool> {
    BATCH_POOL
        .get_or_init(|| build_pool("batch", BATCH_CONCURRENCY))
        .as_ref()
}
