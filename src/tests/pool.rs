use super::*;

#[test]
fn new_pool_holds_one_chunk() {
    let pool = counting_pool(4096);
    assert_eq!(live_blocks(), 1);
    assert_eq!(pool.chunk_size(), 4096);
    assert_eq!(pool.depth(), 0);
    assert_eq!(pool.stats().chunks, 1);
    assert_eq!(pool.stats().big_blocks, 0);
    assert!(pool.remaining() < 4096);
}

#[test]
fn chunk_size_hint_is_floored() {
    let pool = counting_pool(1);
    assert!(pool.chunk_size() >= MIN_CHUNK_SIZE);
    assert_eq!(pool.chunk_size() % ALIGN, 0);
}

#[test]
fn close_releases_everything() {
    let mut pool = counting_pool(4096);
    pool.allocate(100).unwrap();
    pool.push_mark().unwrap();
    pool.allocate(20_000).unwrap();
    pool.allocate(1000).unwrap();
    assert!(live_blocks() > 1);

    pool.close();
    assert_eq!(live_blocks(), 0);
}

#[test]
fn drop_releases_everything() {
    {
        let mut pool = counting_pool(1024);
        for _ in 0..64 {
            pool.allocate(300).unwrap();
        }
    }
    assert_eq!(live_blocks(), 0);
}

#[test]
fn default_heap_source() {
    let _trace = tracing::subscriber::set_default(
        tracing_subscriber::fmt().with_test_writer().finish(),
    );
    let mut pool = Pool::new(PoolConfig::default()).unwrap();
    assert_eq!(pool.chunk_size(), DEFAULT_CHUNK_SIZE);
    let block = pool.allocate_copy(b"heap backed").unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 11) };
    assert_eq!(bytes, b"heap backed");
}

#[test]
fn half_configured_source_is_invalid() {
    let config = PoolConfig {
        free: Some(counting_free),
        ..PoolConfig::default()
    };
    let err = Pool::new(config).unwrap_err();
    assert!(matches!(err, PoolError::InvalidParameter { .. }));
}

#[test]
fn init_failure_is_reported() {
    let config = counting_config(4096);
    set_budget(0);
    let err = Pool::new(config).unwrap_err();
    assert_eq!(err, PoolError::NoMemory { requested: 4096 });
}

#[test]
#[should_panic(expected = "Pool::new failed")]
fn init_failure_panics_when_configured() {
    let config = counting_config(4096).with_failure_policy(FailurePolicy::Panic);
    set_budget(0);
    let _ = Pool::new(config);
}

#[test]
fn allocations_in_one_chunk_increase() {
    let mut pool = counting_pool(4096);
    let mut previous_end = 0;
    for size in [1, 7, 8, 9, 31, 64, 100, 3] {
        let block = pool.allocate(size).unwrap().as_ptr().addr();
        assert_eq!(block % ALIGN, 0);
        assert!(block >= previous_end);
        previous_end = block + size;
    }
    assert_eq!(pool.stats().chunks, 1);
}

#[test]
fn zero_sized_allocation_consumes_nothing() {
    let mut pool = counting_pool(4096);
    let before = pool.remaining();
    let a = pool.allocate(0).unwrap();
    let b = pool.allocate(8).unwrap();
    assert_eq!(a, b);
    assert_eq!(pool.remaining(), before - 8);
}

#[test]
fn copy_and_zeroed() {
    let mut pool = counting_pool(4096);
    let copy = pool.allocate_copy(&[1, 2, 3, 4, 5]).unwrap();
    let zeroed = pool.allocate_zeroed(40).unwrap();

    let copy = unsafe { std::slice::from_raw_parts(copy.as_ptr(), 5) };
    let zeroed = unsafe { std::slice::from_raw_parts(zeroed.as_ptr(), 40) };
    assert_eq!(copy, &[1, 2, 3, 4, 5]);
    assert!(zeroed.iter().all(|&b| b == 0));
}

#[test]
fn oversized_request_gets_enlarged_chunk() {
    let mut pool = counting_pool(4096);
    let p0 = pool.allocate(100).unwrap();
    let (start, end) = current_chunk(&pool);
    assert!((start..end).contains(&p0.as_ptr().addr()));

    // Over half a chunk: a fresh chunk of 8000 + 4096, not a big block.
    let p1 = pool.allocate(8000).unwrap();
    let (start, end) = current_chunk(&pool);
    assert_eq!(p1.as_ptr().addr(), start);
    assert_eq!(end - start, 8000 + 4096);
    assert_eq!(pool.stats().big_blocks, 0);
    assert_eq!(pool.stats().chunks, 2);

    // The tail of the enlarged chunk serves the next request.
    let p2 = pool.allocate(16).unwrap();
    assert_eq!(p2.as_ptr().addr(), p1.as_ptr().addr() + 8000);
    assert_eq!(pool.stats().chunks, 2);
    assert_eq!(live_blocks(), 2);
}

#[test]
fn room_of_one_eighth_falls_back_to_big_block() {
    let mut pool = counting_pool(4096);
    let eighth = pool.chunk_size() / 8;
    pool.allocate(pool.remaining() - eighth).unwrap();
    assert_eq!(pool.remaining(), eighth);

    let (start, end) = current_chunk(&pool);
    let big = pool.allocate(1000).unwrap().as_ptr().addr();
    assert!(!(start..end).contains(&big));
    assert_eq!(pool.stats().big_blocks, 1);
    assert_eq!(pool.stats().chunks, 1);

    // The chunk tail is still in use for small requests.
    assert_eq!(pool.remaining(), eighth);
    let small = pool.allocate(16).unwrap().as_ptr().addr();
    assert!((start..end).contains(&small));
}

#[test]
fn room_below_one_eighth_takes_fresh_chunk() {
    let mut pool = counting_pool(4096);
    let eighth = pool.chunk_size() / 8;
    pool.allocate(pool.remaining() - eighth + ALIGN).unwrap();
    assert!(pool.remaining() < eighth);

    let (start, end) = current_chunk(&pool);
    let block = pool.allocate(1000).unwrap().as_ptr().addr();
    assert!(!(start..end).contains(&block));
    assert_eq!(pool.stats().chunks, 2);
    assert_eq!(pool.stats().big_blocks, 0);
    assert_eq!(pool.remaining(), pool.chunk_size() - 1000);
}

#[test]
fn request_above_maximum_fails_without_panicking() {
    let mut pool = counting_pool(4096);
    for size in [MAX_ALLOCATION + 1, usize::MAX, MAX_ALLOCATION] {
        let err = pool.allocate(size).unwrap_err();
        assert_eq!(err, PoolError::NoMemory { requested: size });
    }
    assert_eq!(live_blocks(), 1);
    pool.validate().unwrap();
}

#[test]
#[should_panic(expected = "allocate failed")]
fn request_above_maximum_panics_when_configured() {
    let mut pool =
        Pool::new(counting_config(4096).with_failure_policy(FailurePolicy::Panic)).unwrap();
    let _ = pool.allocate(usize::MAX);
}

#[test]
fn exhausted_source_leaves_pool_usable() {
    let mut pool = counting_pool(4096);
    let remaining = pool.remaining();
    set_budget(0);

    let err = pool.allocate(remaining + 1).unwrap_err();
    assert!(matches!(err, PoolError::NoMemory { .. }));
    assert_eq!(pool.remaining(), remaining);

    // The fast path needs no new memory.
    pool.allocate(64).unwrap();
    pool.validate().unwrap();
}

#[test]
fn stats_track_reserved_bytes() {
    let mut pool = counting_pool(4096);
    let eighth = pool.chunk_size() / 8;
    pool.allocate(pool.remaining() - eighth).unwrap();
    pool.allocate(1000).unwrap();

    let stats = pool.stats();
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.big_blocks, 1);
    assert_eq!(stats.reserved_bytes, pool.chunk_size() + 1000);
    assert_eq!(stats.depth, 0);
}

#[test]
fn debug_output() {
    let pool = counting_pool(4096);
    let out = format!("{pool:?}");
    assert!(out.starts_with("Pool {"));
    assert!(out.contains("chunk_size: 4096"));
}
