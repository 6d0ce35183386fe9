//! Thread pools for per-LD-block work.

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::error::{Result, SimError};

/// Runs `f` on a dedicated pool of `threads` workers, or on rayon's global
/// pool when `threads` is `None`.
pub fn with_block_pool<T, F>(threads: Option<usize>, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send,
    T: Send,
{
    match threads {
        None => f(),
        Some(n) => ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| SimError::InvalidArgument(format!("cannot start {n} worker threads: {e}")))?
            .install(f),
    }
}

/// Maps `f` over `items` in order. A failure reports the first failing item
/// in input order, whatever the scheduling.
pub fn map_items<I, T, F>(items: &[I], parallel: bool, f: F) -> Result<Vec<T>>
where
    I: Sync,
    T: Send,
    F: Fn(usize, &I) -> Result<T> + Sync + Send,
{
    if !parallel {
        return items.iter().enumerate().map(|(i, item)| f(i, item)).collect();
    }
    let results: Vec<Result<T>> = items.par_iter().enumerate().map(|(i, item)| f(i, item)).collect();
    results.into_iter().collect()
}

pub fn block_threads(cores: Option<usize>, n_blocks: usize) -> Option<usize> {
    let cores = cores?;
    let threads = cores.clamp(1, n_blocks.max(1));
    if threads < cores {
        tracing::warn!("{cores} cores requested for {n_blocks} LD blocks; using {threads}");
    }
    Some(threads)
}
