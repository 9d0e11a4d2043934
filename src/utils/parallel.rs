//! Bounded worker pools

use crate::error::{PhishGuardError, Result};
use rayon::prelude::*;

/// Build a pool with `n_threads` workers (None = one per core)
pub fn build_pool(n_threads: Option<usize>) -> Result<rayon::ThreadPool> {
    let n = n_threads.unwrap_or_else(rayon::current_num_threads).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .thread_name(|i| format!("phishguard-worker-{i}"))
        .build()
        .map_err(|e| PhishGuardError::config(format!("failed to build thread pool: {e}")))
}

/// Map `f` over `items` on `pool`; output order matches input order
pub fn ordered_map<T, U, F>(pool: &rayon::ThreadPool, items: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Send + Sync,
{
    pool.install(|| items.par_iter().map(f).collect())
}
