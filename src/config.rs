//! Pool configuration.

use tracing::{error, warn};

use crate::align::{self, MAX_ALLOCATION};
use crate::chunk::{ChunkAllocFn, ChunkFreeFn, ChunkSource};
use crate::error::{PoolError, PoolResult};

/// Smallest usable chunk size a pool will run with.
pub const MIN_CHUNK_SIZE: usize = 1000;

/// Chunk size used by [`PoolConfig::default`].
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// What a fallible allocation does when memory runs out.
///
/// Consulted by [`Pool::new`](crate::Pool::new), the allocation calls and
/// mark/frame pushes. The resize calls never consult it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FailurePolicy {
    /// Return the error to the caller.
    #[default]
    Return,
    /// Panic with a diagnostic message.
    Panic,
}

impl FailurePolicy {
    /// Applies the policy to `err` raised by `operation`.
    pub(crate) fn fail<T>(self, operation: &'static str, err: PoolError) -> PoolResult<T> {
        match self {
            Self::Return => {
                warn!(operation, %err, "pool operation failed");
                Err(err)
            }
            Self::Panic => {
                error!(operation, %err, "pool operation failed, panicking");
                panic!("{operation} failed: {err}");
            }
        }
    }
}

/// Configuration for [`Pool`](crate::Pool).
///
/// # Example
///
/// ```
/// use markstack::{FailurePolicy, Pool, PoolConfig};
///
/// let config = PoolConfig::default()
///     .with_chunk_size(4096)
///     .with_failure_policy(FailurePolicy::Return);
/// let pool = Pool::new(config).unwrap();
/// assert_eq!(pool.chunk_size(), 4096);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Usable bytes per chunk. Floored to [`MIN_CHUNK_SIZE`] and rounded up
    /// to the alignment unit when the pool is created.
    pub chunk_size: usize,

    /// Chunk allocate function. `None` selects the C heap.
    pub allocate: Option<ChunkAllocFn>,
    /// Chunk free function. Must be set exactly when `allocate` is.
    pub free: Option<ChunkFreeFn>,

    /// Behavior on allocation failure.
    pub failure_policy: FailurePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            allocate: None,
            free: None,
            failure_policy: FailurePolicy::Return,
        }
    }
}

impl PoolConfig {
    /// Sets the chunk size hint.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Draws chunks from a custom allocate/free pair.
    #[must_use]
    pub const fn with_chunk_source(mut self, allocate: ChunkAllocFn, free: ChunkFreeFn) -> Self {
        self.allocate = Some(allocate);
        self.free = Some(free);
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Chunk size the pool will actually use.
    #[must_use]
    pub fn effective_chunk_size(&self) -> usize {
        let floored = self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_ALLOCATION);
        align::align_up(floored).unwrap_or(MAX_ALLOCATION)
    }

    /// Resolves the configured chunk source.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidParameter`] if only one of `allocate` and `free`
    /// is set.
    pub(crate) fn chunk_source(&self) -> PoolResult<ChunkSource> {
        match (self.allocate, self.free) {
            (None, None) => Ok(ChunkSource::heap()),
            (Some(allocate), Some(free)) => Ok(ChunkSource::custom(allocate, free)),
            _ => Err(PoolError::InvalidParameter {
                reason: "chunk allocate and free functions must be supplied together",
            }),
        }
    }
}
