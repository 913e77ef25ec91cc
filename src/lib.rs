//! Stack-discipline (LIFO) region allocator.
//!
//! `markstack` hands out variable-sized blocks of raw memory by bumping a
//! pointer through large chunks, and releases *everything* allocated after
//! a saved point in a single step instead of freeing blocks one by one.
//! This is the classic "arena with checkpoints" pattern for per-request or
//! per-call-frame scratch memory.
//!
//! # Concepts
//!
//! - [`Pool`] — owns the chunks and the mark stack
//! - [`Mark`] — a checkpoint; [`Pool::pop_mark`] discards everything
//!   allocated since it was pushed
//! - frames — [`Pool::push_frame`] fuses a mark push with an allocation
//! - big blocks — standalone allocations for requests too large to carve
//!   economically from the current chunk
//! - [`MarkGuard`] — pops its mark on drop
//!
//! # Key properties
//!
//! - **O(1) allocation**: a bounds check and a pointer bump on the fast path
//! - **Bulk release**: popping a mark costs O(chunks released)
//! - **Resizable tail**: the most recent allocation can grow or shrink in
//!   place ([`Pool::expand_last`], [`Pool::shrink_last`],
//!   [`Pool::resize_last`])
//! - **Pluggable memory source**: chunks come from `malloc`/`free` or a
//!   caller-supplied pair
//! - **Single-threaded**: `Send`, not `Sync`
//!
//! # Example
//!
//! ```
//! use markstack::{Pool, PoolConfig};
//!
//! let mut pool = Pool::new(PoolConfig::default().with_chunk_size(4096)).unwrap();
//!
//! let frame = pool.push_frame(256).unwrap();
//! unsafe { frame.as_ptr().write_bytes(0, 256) };
//!
//! pool.allocate_copy(b"hello").unwrap();
//! let line = pool.expand_last(8, true).unwrap(); // grows in place
//! assert_eq!(unsafe { std::slice::from_raw_parts(line.as_ptr(), 5) }, b"hello");
//!
//! pool.pop_frame(); // releases the frame and everything above it
//! assert_eq!(pool.depth(), 0);
//! pool.validate().unwrap();
//! ```

#![deny(missing_docs)]

mod align;
mod checkpoint;
mod chunk;
mod config;
mod error;
mod iter;
mod pool;
mod resize;
mod validate;

pub use align::{ALIGN, MAX_ALLOCATION};
pub use checkpoint::Mark;
pub use chunk::{ChunkAllocFn, ChunkFreeFn};
pub use config::{DEFAULT_CHUNK_SIZE, FailurePolicy, MIN_CHUNK_SIZE, PoolConfig};
pub use error::{PoolError, PoolResult};
pub use iter::MarkChain;
pub use pool::{MarkGuard, Pool, PoolStats};

#[cfg(test)]
mod tests;
