//! Work partitioning for kernel execution.
//!
//! Every kernel splits its output into disjoint chunks (row bands of C,
//! channel planes, channel blocks) and hands each chunk to a
//! [`WorkSplitter`]. A chunk's computation reads only shared read-only
//! inputs and writes only its own chunk, so no synchronisation is needed
//! inside a kernel call.
//!
//! Passing `None` as the context runs everything on the caller's thread.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "parallel")]
use std::sync::Arc;

#[cfg(feature = "parallel")]
use crate::error::{KernelError, Result};

/// Unit of work handed to a splitter: chunk index and the chunk itself.
pub type ChunkOp<'a> = dyn Fn(usize, &mut [f32]) + Sync + 'a;

/// Capability to fan out independent chunks of an output buffer.
pub trait WorkSplitter: Sync {
    /// Number of workers the splitter can keep busy.
    fn degree_of_parallelism(&self) -> usize;

    /// Run `op(index, chunk)` for every `chunk_len`-sized chunk of `data`.
    ///
    /// The final chunk may be shorter. Chunks may run in any order and
    /// concurrently.
    fn for_each_chunk(&self, data: &mut [f32], chunk_len: usize, op: &ChunkOp<'_>);
}

/// Runs every chunk in order on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl WorkSplitter for Sequential {
    fn degree_of_parallelism(&self) -> usize {
        1
    }

    fn for_each_chunk(&self, data: &mut [f32], chunk_len: usize, op: &ChunkOp<'_>) {
        if chunk_len == 0 {
            return;
        }
        for (index, chunk) in data.chunks_mut(chunk_len).enumerate() {
            op(index, chunk);
        }
    }
}

static SEQUENTIAL: Sequential = Sequential;

/// Resolve an optional context, falling back to [`Sequential`].
#[inline]
pub(crate) fn resolve(ctx: Option<&dyn WorkSplitter>) -> &dyn WorkSplitter {
    ctx.unwrap_or(&SEQUENTIAL)
}

/// Runs chunks on a rayon thread pool.
///
/// With no dedicated pool, rayon's global pool is used.
#[cfg(feature = "parallel")]
#[derive(Debug, Clone, Default)]
pub struct RayonSplitter {
    pool: Option<Arc<rayon::ThreadPool>>,
}

#[cfg(feature = "parallel")]
impl RayonSplitter {
    /// Use rayon's global pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Build a dedicated pool with a fixed number of threads.
    pub fn with_threads(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("nchwc-worker-{}", i))
            .build()
            .map_err(|e| KernelError::ThreadPool(e.to_string()))?;
        log::debug!("built kernel thread pool with {} threads", pool.current_num_threads());
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }
}

#[cfg(feature = "parallel")]
impl WorkSplitter for RayonSplitter {
    fn degree_of_parallelism(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn for_each_chunk(&self, data: &mut [f32], chunk_len: usize, op: &ChunkOp<'_>) {
        if chunk_len == 0 {
            return;
        }
        let mut run = move || {
            data.par_chunks_mut(chunk_len)
                .enumerate()
                .for_each(|(index, chunk)| op(index, chunk));
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}
