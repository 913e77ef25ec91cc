use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::align::{self, MAX_ALLOCATION};
use crate::checkpoint::{MARK_SIZE, Mark, MarkRecord, MarkStamp};
use crate::chunk::{self, ChunkHeader, ChunkSource};
use crate::config::{FailurePolicy, PoolConfig};
use crate::error::{PoolError, PoolResult};
use crate::iter::MarkChain;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Stack-discipline region allocator.
///
/// Hands out word-aligned blocks of raw memory by bumping a pointer through
/// large chunks. Nothing is freed individually: [`push_mark`](Pool::push_mark)
/// saves the current state and [`pop_mark`](Pool::pop_mark) releases every
/// chunk and big block allocated since, in one step.
///
/// # Example
///
/// ```
/// use markstack::{Pool, PoolConfig};
///
/// let mut pool = Pool::new(PoolConfig::default()).unwrap();
/// let keep = pool.allocate(64).unwrap();
///
/// let mark = pool.push_mark().unwrap();
/// let scratch = pool.allocate(1 << 16).unwrap();
/// unsafe { scratch.as_ptr().write_bytes(0xAB, 1 << 16) };
/// pool.pop_mark(mark); // scratch is gone, keep is still valid
///
/// unsafe { keep.as_ptr().write(1) };
/// pool.close();
/// ```
///
/// # Architecture
///
/// Mark records live in a `Vec` (index 0 is the bottom mark, the last entry
/// is the live cursor) but each one still occupies a small stamped footprint
/// in the chunk it was pushed into. Chunks and big blocks are raw blocks from
/// the configured [`ChunkSource`](crate::PoolConfig::with_chunk_source), each
/// starting with a header linking it to the block acquired before it.
///
/// | Request | Served from |
/// |---|---|
/// | fits in the current chunk | bump pointer |
/// | room left `< chunk_size / 8`, or request `> chunk_size / 2` | a fresh chunk |
/// | anything else | a standalone big block |
pub struct Pool {
    pub(crate) id: u64,
    /// Mark stack. Never empty.
    pub(crate) marks: Vec<MarkRecord>,
    /// State of the bottom mark right after initialization.
    pub(crate) floor: MarkRecord,
    pub(crate) chunk_size: usize,
    pub(crate) source: ChunkSource,
    policy: FailurePolicy,
    /// Marks pushed so far; numbers the next push.
    pushes: u64,
}

// SAFETY: Pool exclusively owns every chunk behind its raw pointers and
// hands out no shared state. It is not Sync: all access needs `&mut self`
// or external serialization.
unsafe impl Send for Pool {}

/// Snapshot of a pool's memory usage, from [`Pool::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Chunks currently held.
    pub chunks: usize,
    /// Big blocks currently held.
    pub big_blocks: usize,
    /// Usable bytes across all chunks and big blocks.
    pub reserved_bytes: usize,
    /// Marks above the bottom mark.
    pub depth: usize,
}

/// Rounds a request to the alignment unit, rejecting oversized ones.
pub(crate) fn round_request(size: usize) -> PoolResult<usize> {
    if size > MAX_ALLOCATION {
        return Err(PoolError::no_memory(size));
    }
    align::align_up(size).ok_or_else(|| PoolError::no_memory(size))
}

impl Pool {
    /// Creates a pool and acquires its first chunk.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidParameter`] if only one of the chunk allocate and
    /// free functions is configured. [`PoolError::NoMemory`] if the first
    /// chunk cannot be obtained.
    ///
    /// # Panics
    ///
    /// Panics instead of returning `NoMemory` under [`FailurePolicy::Panic`].
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        let source = config.chunk_source()?;
        let chunk_size = config.effective_chunk_size();
        let policy = config.failure_policy;

        let Some(chunk) = source.acquire(chunk_size, ptr::null_mut()) else {
            return policy.fail("Pool::new", PoolError::no_memory(chunk_size));
        };
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);

        let mut floor = MarkRecord {
            owner: id,
            serial: 0,
            previous: None,
            chunk,
            // SAFETY: `chunk` was just acquired.
            free: unsafe { ChunkHeader::data_start(chunk) },
            big_blocks: ptr::null_mut(),
            last: None,
            footprint: NonNull::dangling(),
        };
        // chunk_size >= MIN_CHUNK_SIZE, always room for the bottom mark.
        floor.footprint = floor.bump(MARK_SIZE);
        // SAFETY: the footprint was just carved from the chunk.
        unsafe { MarkStamp { owner: id, depth: 0 }.write(floor.footprint) };

        debug!(pool = id, chunk_size, ?policy, "pool initialized");
        Ok(Self {
            id,
            marks: vec![floor],
            floor,
            chunk_size,
            source,
            policy,
            pushes: 0,
        })
    }

    /// Creates a heap-backed pool with the given chunk size hint.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoMemory`] if the first chunk cannot be obtained.
    pub fn with_chunk_size(chunk_size: usize) -> PoolResult<Self> {
        Self::new(PoolConfig::default().with_chunk_size(chunk_size))
    }

    /// Releases everything the pool holds.
    ///
    /// Same as dropping the pool.
    pub fn close(self) {
        drop(self);
    }

    /// Usable bytes per chunk after flooring and rounding the hint.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The configured failure policy.
    #[must_use]
    pub const fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Number of marks above the bottom mark.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.marks.len() - 1
    }

    /// Free bytes left in the current chunk.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.top().remaining()
    }

    pub(crate) fn top(&self) -> &MarkRecord {
        &self.marks[self.marks.len() - 1]
    }

    pub(crate) fn top_mut(&mut self) -> &mut MarkRecord {
        let depth = self.marks.len() - 1;
        &mut self.marks[depth]
    }

    // -- allocation ---------------------------------------------------------

    /// Allocates `size` bytes, rounded up to the alignment unit.
    ///
    /// The memory is uninitialized and stays valid until the mark that was
    /// on top during this call is popped, or the pool is closed.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoMemory`] if `size` exceeds
    /// [`MAX_ALLOCATION`](crate::MAX_ALLOCATION) or no chunk or big block
    /// can be obtained.
    ///
    /// # Panics
    ///
    /// Panics instead of returning an error under [`FailurePolicy::Panic`].
    pub fn allocate(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        match self.try_allocate(size) {
            Ok(block) => Ok(block),
            Err(err) => self.policy.fail("allocate", err),
        }
    }

    /// Allocates a copy of `bytes`.
    ///
    /// # Errors
    ///
    /// Same as [`allocate`](Self::allocate).
    ///
    /// # Panics
    ///
    /// Same as [`allocate`](Self::allocate).
    pub fn allocate_copy(&mut self, bytes: &[u8]) -> PoolResult<NonNull<u8>> {
        let block = self.allocate(bytes.len())?;
        // SAFETY: `block` is a fresh allocation of at least `bytes.len()`
        // bytes and cannot overlap a borrowed slice.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), block.as_ptr(), bytes.len()) };
        Ok(block)
    }

    /// Allocates `size` zeroed bytes.
    ///
    /// # Errors
    ///
    /// Same as [`allocate`](Self::allocate).
    ///
    /// # Panics
    ///
    /// Same as [`allocate`](Self::allocate).
    pub fn allocate_zeroed(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        let block = self.allocate(size)?;
        // SAFETY: `block` is a fresh allocation of at least `size` bytes.
        unsafe { block.as_ptr().write_bytes(0, size) };
        Ok(block)
    }

    /// Allocation that never consults the failure policy.
    pub(crate) fn try_allocate(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        let rounded = round_request(size)?;
        let top = self.top_mut();
        if top.has_room(rounded) {
            let block = top.bump(rounded);
            top.last = Some(block);
            return Ok(block);
        }
        self.allocate_slow(size, rounded)
    }

    /// Serves a request the current chunk cannot hold.
    fn allocate_slow(&mut self, requested: usize, size: usize) -> PoolResult<NonNull<u8>> {
        let chunk_size = self.chunk_size;
        let source = self.source;
        let top = self.top_mut();

        let oversized = size > chunk_size / 2;
        if top.remaining() < chunk_size / 8 || oversized {
            let usable = if oversized {
                size.checked_add(chunk_size)
                    .filter(|&usable| usable <= MAX_ALLOCATION)
                    .ok_or_else(|| PoolError::no_memory(requested))?
            } else {
                chunk_size
            };
            let chunk = source
                .acquire(usable, top.chunk)
                .ok_or_else(|| PoolError::no_memory(requested))?;
            top.chunk = chunk;
            // SAFETY: `chunk` was just acquired.
            top.free = unsafe { ChunkHeader::data_start(chunk) };
            let block = top.bump(size);
            top.last = Some(block);
            return Ok(block);
        }

        let big = source
            .acquire(size, top.big_blocks)
            .ok_or_else(|| PoolError::no_memory(requested))?;
        top.big_blocks = big;
        // SAFETY: `big` was just acquired.
        let block = unsafe { NonNull::new_unchecked(ChunkHeader::data_start(big)) };
        top.last = Some(block);
        debug!(size, "served request from a big block");
        Ok(block)
    }

    // -- marks --------------------------------------------------------------

    /// Handle to the live (topmost) mark.
    #[must_use]
    pub fn top_mark(&self) -> Mark {
        Mark::new(self.id, self.depth(), self.top().serial)
    }

    /// Handle to the bottom mark, the pool's permanent floor.
    #[must_use]
    pub const fn bottom_mark(&self) -> Mark {
        Mark::new(self.id, 0, 0)
    }

    /// Iterates over the marks from the top mark down to the bottom mark.
    #[must_use]
    pub fn marks(&self) -> MarkChain<'_> {
        MarkChain::new(&self.marks, self.id)
    }

    /// Saves the current state as a new mark on top of the stack.
    ///
    /// The mark takes a few bytes from the current chunk, or from a fresh
    /// chunk if the current one is full.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoMemory`] if a fresh chunk is needed and cannot be
    /// obtained.
    ///
    /// # Panics
    ///
    /// Panics instead of returning an error under [`FailurePolicy::Panic`].
    pub fn push_mark(&mut self) -> PoolResult<Mark> {
        match self.try_push_mark() {
            Ok(mark) => Ok(mark),
            Err(err) => self.policy.fail("push_mark", err),
        }
    }

    fn try_push_mark(&mut self) -> PoolResult<Mark> {
        let mut record = self.stacked_record();
        if !record.has_room(MARK_SIZE) {
            let chunk = self
                .source
                .acquire(self.chunk_size, record.chunk)
                .ok_or_else(|| PoolError::no_memory(MARK_SIZE))?;
            record.chunk = chunk;
            // SAFETY: `chunk` was just acquired.
            record.free = unsafe { ChunkHeader::data_start(chunk) };
        }
        Ok(self.install(record))
    }

    /// A record continuing from the current top, not yet pushed.
    fn stacked_record(&self) -> MarkRecord {
        let below = self.top();
        MarkRecord {
            owner: self.id,
            serial: 0,
            previous: Some(self.marks.len() - 1),
            chunk: below.chunk,
            free: below.free,
            big_blocks: below.big_blocks,
            last: None,
            footprint: NonNull::dangling(),
        }
    }

    /// Carves the footprint for `record` and pushes it.
    ///
    /// `record` must have room for [`MARK_SIZE`] bytes.
    fn install(&mut self, mut record: MarkRecord) -> Mark {
        let depth = self.marks.len();
        self.pushes += 1;
        record.serial = self.pushes;
        record.footprint = record.bump(MARK_SIZE);
        // SAFETY: the footprint was just carved from a live chunk.
        unsafe {
            MarkStamp {
                owner: self.id,
                depth,
            }
            .write(record.footprint);
        }
        self.marks.push(record);
        trace!(pool = self.id, depth, "pushed mark");
        Mark::new(self.id, depth, record.serial)
    }

    /// Returns `true` if `mark` is still on this pool's stack.
    pub(crate) fn holds(&self, mark: Mark) -> bool {
        mark.pool() == self.id
            && self
                .marks
                .get(mark.depth())
                .is_some_and(|record| record.serial == mark.serial())
    }

    /// Restores the state saved just before `mark` was pushed.
    ///
    /// Releases every chunk and big block acquired since, and discards
    /// `mark` along with every mark pushed after it. Popping the bottom mark
    /// resets the pool to its freshly initialized state but keeps its first
    /// chunk.
    ///
    /// O(chunks released).
    ///
    /// # Panics
    ///
    /// Panics if `mark` belongs to another pool or was already discarded.
    pub fn pop_mark(&mut self, mark: Mark) {
        assert_eq!(
            mark.pool(),
            self.id,
            "{mark:?} does not belong to pool {}",
            self.id,
        );
        assert!(
            mark.depth() < self.marks.len(),
            "{mark:?} beyond current depth {}",
            self.depth(),
        );
        assert_eq!(
            self.marks[mark.depth()].serial,
            mark.serial(),
            "{mark:?} was already popped",
        );

        let target = match mark.depth() {
            0 => self.floor,
            depth => self.marks[depth - 1],
        };
        let top = *self.top();

        // SAFETY: both lists only ever grow at the head, so the target's heads
        // are reachable from the top's heads. Big blocks go first: they are
        // never referenced from chunk memory.
        let (big_blocks, chunks) = unsafe {
            (
                self.source.release_until(top.big_blocks, target.big_blocks),
                self.source.release_until(top.chunk, target.chunk),
            )
        };

        if mark.is_bottom() {
            self.marks.clear();
            self.marks.push(self.floor);
        } else {
            self.marks.truncate(mark.depth());
        }
        trace!(
            pool = self.id,
            depth = mark.depth(),
            chunks,
            big_blocks,
            "popped mark"
        );
    }

    /// Pops every mark and releases everything but the first chunk.
    pub fn reset(&mut self) {
        self.pop_mark(self.bottom_mark());
    }

    /// Pushes a mark that is popped when the returned guard is dropped.
    ///
    /// The guard dereferences to the pool.
    ///
    /// # Errors
    ///
    /// Same as [`push_mark`](Self::push_mark).
    ///
    /// # Panics
    ///
    /// Same as [`push_mark`](Self::push_mark).
    pub fn scoped(&mut self) -> PoolResult<MarkGuard<'_>> {
        let mark = self.push_mark()?;
        Ok(MarkGuard { pool: self, mark })
    }

    // -- frames -------------------------------------------------------------

    /// Pushes a mark and allocates `size` bytes above it.
    ///
    /// Takes a single bump when the mark and the block both fit in the
    /// current chunk. Undo with [`pop_frame`](Self::pop_frame).
    ///
    /// # Errors
    ///
    /// [`PoolError::NoMemory`] as for [`allocate`](Self::allocate). On error
    /// the pool is left exactly as it was.
    ///
    /// # Panics
    ///
    /// Panics instead of returning an error under [`FailurePolicy::Panic`].
    pub fn push_frame(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        match self.try_push_frame(size) {
            Ok(block) => Ok(block),
            Err(err) => self.policy.fail("push_frame", err),
        }
    }

    fn try_push_frame(&mut self, size: usize) -> PoolResult<NonNull<u8>> {
        let rounded = round_request(size)?;
        let mut record = self.stacked_record();
        if let Some(combined) = MARK_SIZE.checked_add(rounded)
            && record.has_room(combined)
        {
            // SAFETY: the combined region fits, so the block start stays
            // inside the chunk.
            let block = unsafe { NonNull::new_unchecked(record.free.add(MARK_SIZE)) };
            record.last = Some(block);
            self.install(record);
            self.top_mut().bump(rounded);
            return Ok(block);
        }

        let mark = self.try_push_mark()?;
        self.try_allocate(size).inspect_err(|_| self.pop_mark(mark))
    }

    /// Pops the topmost mark.
    pub fn pop_frame(&mut self) {
        self.pop_mark(self.top_mark());
    }

    // -- inspection ---------------------------------------------------------

    /// Counts the chunks and big blocks the pool currently holds.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let top = self.top();
        // SAFETY: every chunk and big block reachable from the live cursor
        // is owned by the pool.
        let ((chunks, chunk_bytes), (big_blocks, big_bytes)) = unsafe {
            (
                chunk::walk(top.chunk, ptr::null_mut()),
                chunk::walk(top.big_blocks, ptr::null_mut()),
            )
        };
        PoolStats {
            chunks,
            big_blocks,
            reserved_bytes: chunk_bytes + big_bytes,
            depth: self.depth(),
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.reset();
        // SAFETY: after a full reset only the first chunk remains, and
        // nothing references it once the pool is gone.
        unsafe { self.source.release(self.floor.chunk) };
        debug!(pool = self.id, "pool closed");
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("depth", &self.depth())
            .field("chunk_size", &self.chunk_size)
            .field("remaining", &self.remaining())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Guard returned by [`Pool::scoped`]. Pops its mark on drop.
///
/// # Example
///
/// ```
/// use markstack::Pool;
///
/// let mut pool = Pool::with_chunk_size(4096).unwrap();
/// {
///     let mut scope = pool.scoped().unwrap();
///     let tmp = scope.allocate(128).unwrap();
///     unsafe { tmp.as_ptr().write_bytes(0, 128) };
/// }
/// assert_eq!(pool.depth(), 0);
/// ```
#[must_use = "the mark is popped as soon as the guard is dropped"]
pub struct MarkGuard<'a> {
    pool: &'a mut Pool,
    mark: Mark,
}

impl MarkGuard<'_> {
    /// The mark this guard pops.
    #[must_use]
    pub const fn mark(&self) -> Mark {
        self.mark
    }
}

impl Deref for MarkGuard<'_> {
    type Target = Pool;

    fn deref(&self) -> &Pool {
        self.pool
    }
}

impl DerefMut for MarkGuard<'_> {
    fn deref_mut(&mut self) -> &mut Pool {
        self.pool
    }
}

impl Drop for MarkGuard<'_> {
    fn drop(&mut self) {
        // Already gone if the mark was popped through the guard.
        if self.pool.holds(self.mark) {
            self.pool.pop_mark(self.mark);
        }
    }
}

impl std::fmt::Debug for MarkGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkGuard").field("mark", &self.mark).finish()
    }
}
