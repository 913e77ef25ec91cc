use std::mem;
use std::ptr::{self, NonNull};

use crate::align;
use crate::chunk::ChunkHeader;

/// Handle to a mark (checkpoint) pushed onto a [`Pool`](crate::Pool).
///
/// Created by [`Pool::push_mark`](crate::Pool::push_mark) and friends.
/// Popping a mark releases every chunk and big block allocated after it
/// and discards every mark pushed after it. Popping a discarded handle
/// panics, even if a newer mark has since taken its depth.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mark {
    pool: u64,
    depth: usize,
    serial: u64,
}

impl Mark {
    pub(crate) const fn new(pool: u64, depth: usize, serial: u64) -> Self {
        Self {
            pool,
            depth,
            serial,
        }
    }

    /// Returns the stack depth of this mark. The bottom mark has depth 0.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Returns `true` for the bottom mark, the pool's permanent floor.
    #[must_use]
    pub const fn is_bottom(&self) -> bool {
        self.depth == 0
    }

    pub(crate) const fn pool(&self) -> u64 {
        self.pool
    }

    pub(crate) const fn serial(&self) -> u64 {
        self.serial
    }
}

impl std::fmt::Debug for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mark({}@{})", self.depth, self.pool)
    }
}

/// Stamp written into a mark's footprint in chunk memory.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct MarkStamp {
    pub owner: u64,
    pub depth: usize,
}

/// Chunk bytes consumed by pushing a mark.
pub(crate) const MARK_SIZE: usize =
    (mem::size_of::<MarkStamp>() + align::ALIGN - 1) & !(align::ALIGN - 1);

impl MarkStamp {
    /// Writes the stamp at `at`.
    ///
    /// # Safety
    ///
    /// `at` must be valid for [`MARK_SIZE`] bytes of writes.
    pub unsafe fn write(self, at: NonNull<u8>) {
        // SAFETY: caller guarantees the footprint is writable. Word alignment
        // may be below `u64` alignment on 32-bit targets.
        unsafe { ptr::write_unaligned(at.as_ptr().cast::<Self>(), self) }
    }

    /// Reads the stamp stored at `at`.
    ///
    /// # Safety
    ///
    /// `at` must point to a live mark footprint.
    pub unsafe fn read(at: NonNull<u8>) -> Self {
        // SAFETY: caller guarantees the footprint is live.
        unsafe { ptr::read_unaligned(at.as_ptr().cast::<Self>()) }
    }
}

/// Pool state saved by a mark. The topmost record is the live cursor.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MarkRecord {
    /// Id of the pool this mark belongs to.
    pub owner: u64,
    /// Push number within the pool; 0 for the bottom mark.
    pub serial: u64,
    /// Index of the mark below; `None` only for the bottom mark.
    pub previous: Option<usize>,
    /// Chunk holding the bump pointer.
    pub chunk: *mut ChunkHeader,
    /// Bump pointer: next free byte in `chunk`.
    pub free: *mut u8,
    /// Newest big block, or null.
    pub big_blocks: *mut ChunkHeader,
    /// Most recent allocation while this mark was on top.
    pub last: Option<NonNull<u8>>,
    /// Where the mark's stamp lives.
    pub footprint: NonNull<u8>,
}

impl MarkRecord {
    /// Bytes left between the bump pointer and the end of the chunk.
    pub fn remaining(&self) -> usize {
        // SAFETY: the live cursor's chunk is always live.
        unsafe { (*self.chunk).end.addr() - self.free.addr() }
    }

    /// Returns `true` if `size` more bytes fit in the current chunk.
    pub fn has_room(&self, size: usize) -> bool {
        // SAFETY: the live cursor's chunk is always live.
        let end = unsafe { (*self.chunk).end };
        align::fits(self.free.addr(), size, self.chunk.addr(), end.addr())
    }

    /// Advances the bump pointer by `size` bytes, returning the old value.
    ///
    /// `size` must be aligned and [`has_room`](Self::has_room) must hold.
    pub fn bump(&mut self, size: usize) -> NonNull<u8> {
        debug_assert!(self.has_room(size));
        let start = self.free;
        // SAFETY: has_room guarantees the result stays inside the chunk.
        self.free = unsafe { start.add(size) };
        // SAFETY: `start` lies inside a live chunk, so it is non-null.
        unsafe { NonNull::new_unchecked(start) }
    }

    /// First usable byte of the newest big block, if any.
    pub fn big_block_data(&self) -> Option<NonNull<u8>> {
        if self.big_blocks.is_null() {
            return None;
        }
        // SAFETY: non-null heads are live big blocks.
        NonNull::new(unsafe { ChunkHeader::data_start(self.big_blocks) })
    }

    /// Returns `true` if the last allocation is the newest big block.
    pub fn last_is_big_block(&self) -> bool {
        self.last.is_some() && self.last == self.big_block_data()
    }

    /// Size of the last allocation, or `None` if the last action was a push.
    pub fn last_size(&self) -> Option<usize> {
        let last = self.last?;
        if self.last_is_big_block() {
            // SAFETY: `last_is_big_block` implies a live head.
            Some(unsafe { ChunkHeader::usable(self.big_blocks) })
        } else {
            Some(self.free.addr() - last.as_ptr().addr())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_size_is_aligned() {
        assert_eq!(MARK_SIZE % align::ALIGN, 0);
        assert!(MARK_SIZE >= mem::size_of::<MarkStamp>());
    }

    #[test]
    fn marks_order_by_depth() {
        let a = Mark::new(1, 0, 0);
        let b = Mark::new(1, 3, 7);
        assert!(a < b);
        assert!(a.is_bottom());
        assert_eq!(b.depth(), 3);
        assert_eq!(format!("{b:?}"), "Mark(3@1)");
    }

    #[test]
    fn stamp_roundtrips_through_unaligned_memory() {
        let mut buffer = [0u8; MARK_SIZE + 1];
        let at = NonNull::new(buffer.as_mut_ptr().wrapping_add(1)).unwrap();
        let stamp = MarkStamp { owner: 7, depth: 2 };
        unsafe {
            stamp.write(at);
            assert_eq!(MarkStamp::read(at), stamp);
        }
    }
}
