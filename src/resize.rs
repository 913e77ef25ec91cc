//! Growing and shrinking the most recent allocation.
//!
//! Only the block returned by the last allocation of the live mark can be
//! resized. Chunk allocations grow by advancing the bump pointer when the
//! chunk has room; otherwise the block is copied and the old bytes are
//! abandoned in place until the mark is popped. Big blocks are always
//! replaced by a new big block and the old one is released immediately.
//!
//! None of these calls consult the [`FailurePolicy`](crate::FailurePolicy):
//! failure is always returned, and leaves the pool untouched.

use std::cmp::Ordering;
use std::ptr::{self, NonNull};

use crate::Pool;
use crate::align::{self, MAX_ALLOCATION};
use crate::chunk::ChunkHeader;
use crate::error::{PoolError, PoolResult};
use crate::pool::round_request;

impl Pool {
    /// Grows the last allocation by `increment` bytes.
    ///
    /// Returns the (possibly moved) block. The first bytes of a moved block
    /// are a copy of the old contents. If nothing was allocated since the
    /// last mark push, this is a plain allocation of `increment` bytes.
    ///
    /// # Errors
    ///
    /// [`PoolError::WouldMove`] if the block cannot grow in place and
    /// `allow_move` is `false`. [`PoolError::NoMemory`] if the moved block
    /// cannot be obtained.
    pub fn expand_last(&mut self, increment: usize, allow_move: bool) -> PoolResult<NonNull<u8>> {
        let top = *self.top();
        let Some(last) = top.last else {
            return self.try_allocate(increment);
        };
        let rounded = round_request(increment)?;

        let big = top.last_is_big_block();
        if !big && top.has_room(rounded) {
            self.top_mut().bump(rounded);
            return Ok(last);
        }
        if !allow_move {
            return Err(PoolError::WouldMove {
                requested: increment,
            });
        }

        let old_size = top.last_size().unwrap_or_default();
        let new_size = old_size
            .checked_add(rounded)
            .filter(|&size| size <= MAX_ALLOCATION)
            .ok_or_else(|| PoolError::no_memory(increment))?;

        if big {
            return self.replace_big_block(last, old_size, new_size, increment);
        }
        let block = self.try_allocate(new_size)?;
        // SAFETY: `last` holds `old_size` live bytes; `block` is a fresh,
        // disjoint allocation of `new_size >= old_size` bytes.
        unsafe { ptr::copy_nonoverlapping(last.as_ptr(), block.as_ptr(), old_size) };
        Ok(block)
    }

    /// Moves the newest big block into a larger one and releases it.
    fn replace_big_block(
        &mut self,
        last: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        requested: usize,
    ) -> PoolResult<NonNull<u8>> {
        let source = self.source;
        let top = self.top_mut();
        let old = top.big_blocks;

        // SAFETY: `old` is the live head of the big-block list.
        let below = unsafe { (*old).previous };
        let replacement = source
            .acquire(new_size, below)
            .ok_or_else(|| PoolError::no_memory(requested))?;

        // SAFETY: `replacement` was just acquired with room for `new_size`
        // bytes; `last` is the start of `old`, which holds `old_size` bytes.
        let block = unsafe {
            let block = NonNull::new_unchecked(ChunkHeader::data_start(replacement));
            ptr::copy_nonoverlapping(last.as_ptr(), block.as_ptr(), old_size);
            source.release(old);
            block
        };
        top.big_blocks = replacement;
        top.last = Some(block);
        Ok(block)
    }

    /// Shrinks the last allocation by `decrement` bytes, rounded down to the
    /// alignment unit.
    ///
    /// The block never moves. Big blocks are left as they are, and a
    /// `decrement` larger than the block is ignored. Returns the last
    /// allocation, or `None` if nothing was allocated since the last mark
    /// push.
    pub fn shrink_last(&mut self, decrement: usize, _allow_move: bool) -> Option<NonNull<u8>> {
        let top = self.top_mut();
        let last = top.last?;
        if top.last_is_big_block() {
            return Some(last);
        }

        if decrement <= top.free.addr() - last.as_ptr().addr() {
            // SAFETY: the bump pointer moves back inside the last allocation.
            top.free = unsafe { top.free.sub(align::align_down(decrement)) };
        }
        Some(last)
    }

    /// Resizes the last allocation to `new_size` bytes.
    ///
    /// Shrinks through [`shrink_last`](Self::shrink_last) and grows through
    /// [`expand_last`](Self::expand_last). Resizing to the current size
    /// returns the block unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`expand_last`](Self::expand_last) when growing.
    pub fn resize_last(&mut self, new_size: usize, allow_move: bool) -> PoolResult<NonNull<u8>> {
        let top = *self.top();
        let (Some(last), Some(old_size)) = (top.last, top.last_size()) else {
            return self.try_allocate(new_size);
        };
        let rounded = round_request(new_size)?;

        match rounded.cmp(&old_size) {
            Ordering::Equal => Ok(last),
            Ordering::Less => Ok(self
                .shrink_last(old_size - rounded, allow_move)
                .unwrap_or(last)),
            Ordering::Greater => self.expand_last(rounded - old_size, allow_move),
        }
    }
}
