use std::cell::Cell;
use std::ptr::NonNull;

use super::*;
use crate::chunk::ChunkHeader;

thread_local! {
    /// Chunks handed out by the counting source and not yet freed.
    static LIVE: Cell<usize> = const { Cell::new(0) };
    /// Acquisitions the counting source still grants.
    static BUDGET: Cell<usize> = const { Cell::new(usize::MAX) };
}

fn counting_allocate(size: usize) -> *mut u8 {
    if BUDGET.get() == 0 {
        return std::ptr::null_mut();
    }
    BUDGET.set(BUDGET.get() - 1);
    LIVE.set(LIVE.get() + 1);
    unsafe { libc::malloc(size) }.cast::<u8>()
}

unsafe fn counting_free(memory: *mut u8) {
    if !memory.is_null() {
        LIVE.set(LIVE.get() - 1);
    }
    unsafe { libc::free(memory.cast::<libc::c_void>()) }
}

fn counting_config(chunk_size: usize) -> PoolConfig {
    BUDGET.set(usize::MAX);
    PoolConfig::default()
        .with_chunk_size(chunk_size)
        .with_chunk_source(counting_allocate, counting_free)
}

/// Pool backed by the counting source.
fn counting_pool(chunk_size: usize) -> Pool {
    Pool::new(counting_config(chunk_size)).unwrap()
}

/// Chunks and big blocks currently held from the counting source.
fn live_blocks() -> usize {
    LIVE.get()
}

/// Limits how many more acquisitions succeed.
fn set_budget(acquisitions: usize) {
    BUDGET.set(acquisitions);
}

/// Usable address range `[start, end)` of the pool's current chunk.
fn current_chunk(pool: &Pool) -> (usize, usize) {
    let chunk = pool.top().chunk;
    unsafe { (ChunkHeader::data_start(chunk).addr(), (*chunk).end.addr()) }
}

/// Bump pointer, current chunk and big-block head of the live mark.
fn cursor(pool: &Pool) -> (usize, usize, usize) {
    let top = pool.top();
    (top.free.addr(), top.chunk.addr(), top.big_blocks.addr())
}

fn fill(block: NonNull<u8>, len: usize, seed: u8) {
    for i in 0..len {
        unsafe { block.as_ptr().add(i).write(seed.wrapping_add(i as u8)) };
    }
}

fn holds(block: NonNull<u8>, len: usize, seed: u8) -> bool {
    (0..len).all(|i| unsafe { block.as_ptr().add(i).read() } == seed.wrapping_add(i as u8))
}

mod pool;
