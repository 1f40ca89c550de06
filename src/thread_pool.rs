//! Worker pool behind the LCMV and covariance fan-out.
//!
//! `make_lcmv` solves one small system per source location, and covariance
//! estimation folds epoch windows into Welford accumulators in parallel. A
//! cross-validated noise estimate followed by a filter build runs both in
//! the same call chain, so every parallel section goes through [`install`]
//! on a single process-wide pool rather than rayon's global one. Worker
//! threads are named so profiles attribute time to this crate.

#[cfg(feature = "parallel")]
use std::sync::OnceLock;

#[cfg(feature = "parallel")]
use rayon::{ThreadPool, ThreadPoolBuilder};

#[cfg(feature = "parallel")]
static POOL: OnceLock<ThreadPool> = OnceLock::new();

#[cfg(feature = "parallel")]
fn pool() -> &'static ThreadPool {
    POOL.get_or_init(|| {
        let pool = ThreadPoolBuilder::new()
            .thread_name(|i| format!("meg-inverse-{i}"))
            .build()
            .expect("failed to spawn meg-inverse worker threads");
        tracing::debug!(threads = pool.current_num_threads(), "worker pool started");
        pool
    })
}

/// Run `op` inside the shared pool; rayon iterators in `op` use its workers.
#[cfg(feature = "parallel")]
pub fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    pool().install(op)
}

/// Run `op` on the calling thread.
#[cfg(not(feature = "parallel"))]
pub fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R,
{
    op()
}
