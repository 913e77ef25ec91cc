//! Raw chunks and the pluggable memory source behind them.
//!
//! ```text
//!   ┌──────────────────────┬──────────────────────────────────────┐
//!   │ ChunkHeader          │ usable memory                        │
//!   │ previous │ end ──────┼──────────────────────────────────────┼─► end
//!   └──────────────────────┴──────────────────────────────────────┘
//!                          ▲
//!                          └── data_start()
//! ```
//!
//! Normal chunks and big blocks share this layout. Each pool threads its
//! chunks (and separately its big blocks) into singly linked lists through
//! `previous`, newest first.

use std::mem;

use tracing::debug;

use crate::align::{self, ALIGN};

/// Obtains `size` bytes of raw memory, or null on failure.
///
/// The memory must be aligned to at least pointer width.
pub type ChunkAllocFn = fn(usize) -> *mut u8;

/// Releases memory previously returned by the paired [`ChunkAllocFn`].
///
/// Must treat null as a no-op.
pub type ChunkFreeFn = unsafe fn(*mut u8);

/// Header written at the start of every chunk and big block.
#[repr(C)]
pub(crate) struct ChunkHeader {
    /// Chunk acquired immediately before this one, or null.
    pub previous: *mut ChunkHeader,
    /// Exclusive upper bound of the usable memory.
    pub end: *mut u8,
}

/// Bytes taken by a [`ChunkHeader`], rounded up to the alignment unit.
pub(crate) const HEADER_SIZE: usize = (mem::size_of::<ChunkHeader>() + ALIGN - 1) & !(ALIGN - 1);

impl ChunkHeader {
    /// First usable byte of `chunk`.
    ///
    /// # Safety
    ///
    /// `chunk` must point to a live chunk.
    pub const unsafe fn data_start(chunk: *mut Self) -> *mut u8 {
        // SAFETY: every chunk is at least HEADER_SIZE bytes long.
        unsafe { chunk.cast::<u8>().add(HEADER_SIZE) }
    }

    /// Usable size of `chunk` in bytes.
    ///
    /// # Safety
    ///
    /// `chunk` must point to a live chunk.
    pub unsafe fn usable(chunk: *mut Self) -> usize {
        // SAFETY: caller guarantees `chunk` is live.
        unsafe { (*chunk).end.addr() - Self::data_start(chunk).addr() }
    }
}

fn heap_allocate(size: usize) -> *mut u8 {
    // SAFETY: malloc accepts any size and returns null on failure.
    unsafe { libc::malloc(size) }.cast::<u8>()
}

unsafe fn heap_free(memory: *mut u8) {
    // SAFETY: `memory` came from `heap_allocate` or is null.
    unsafe { libc::free(memory.cast::<libc::c_void>()) }
}

/// The allocate/free pair a pool draws its chunks from.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ChunkSource {
    allocate: ChunkAllocFn,
    free: ChunkFreeFn,
}

impl ChunkSource {
    /// Source backed by the C heap (`malloc` / `free`).
    #[must_use]
    pub const fn heap() -> Self {
        Self {
            allocate: heap_allocate,
            free: heap_free,
        }
    }

    /// Source backed by a caller-supplied pair.
    #[must_use]
    pub const fn custom(allocate: ChunkAllocFn, free: ChunkFreeFn) -> Self {
        Self { allocate, free }
    }

    /// Acquires a chunk with `usable` bytes after the header and links it
    /// in front of `previous`.
    ///
    /// Returns `None` if the size overflows or the source is exhausted.
    pub fn acquire(&self, usable: usize, previous: *mut ChunkHeader) -> Option<*mut ChunkHeader> {
        let usable = align::align_up(usable)?;
        let total = usable.checked_add(HEADER_SIZE)?;
        let memory = (self.allocate)(total);
        if memory.is_null() {
            return None;
        }
        debug_assert_eq!(memory.addr() % ALIGN, 0, "chunk source returned unaligned memory");

        let chunk = memory.cast::<ChunkHeader>();
        // SAFETY: `memory` is a fresh allocation of `total` bytes, word-aligned,
        // and large enough for the header plus `usable` bytes.
        unsafe {
            chunk.write(ChunkHeader {
                previous,
                end: memory.add(total),
            });
        }
        debug!(usable, chunk = ?chunk, "acquired chunk");
        Some(chunk)
    }

    /// Returns a single chunk to the source.
    ///
    /// # Safety
    ///
    /// `chunk` must have come from [`acquire`](Self::acquire) on this source
    /// and must not be used afterwards.
    pub unsafe fn release(&self, chunk: *mut ChunkHeader) {
        debug!(chunk = ?chunk, "released chunk");
        // SAFETY: caller guarantees provenance.
        unsafe { (self.free)(chunk.cast::<u8>()) }
    }

    /// Releases every chunk from `head` up to, but excluding, `stop`,
    /// following `previous` links.
    ///
    /// Returns the number of chunks released.
    ///
    /// # Safety
    ///
    /// `stop` must be null or reachable from `head`, and no released chunk
    /// may be used afterwards.
    pub unsafe fn release_until(&self, head: *mut ChunkHeader, stop: *mut ChunkHeader) -> usize {
        let mut current = head;
        let mut released = 0;
        while current != stop && !current.is_null() {
            // SAFETY: `current` is a live chunk on the list.
            let previous = unsafe { (*current).previous };
            // SAFETY: `current` is no longer referenced by anyone.
            unsafe { self.release(current) };
            released += 1;
            current = previous;
        }
        released
    }
}

/// Counts the chunks on a list from `head` up to, but excluding, `stop`,
/// together with their usable bytes.
///
/// # Safety
///
/// Every chunk on the walked part of the list must be live.
pub(crate) unsafe fn walk(head: *mut ChunkHeader, stop: *mut ChunkHeader) -> (usize, usize) {
    let mut current = head;
    let mut count = 0;
    let mut bytes = 0;
    while current != stop && !current.is_null() {
        count += 1;
        // SAFETY: `current` is live per the caller's contract.
        unsafe {
            bytes += ChunkHeader::usable(current);
            current = (*current).previous;
        }
    }
    (count, bytes)
}
