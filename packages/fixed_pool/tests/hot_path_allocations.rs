//! Verifies that claiming and reclaiming never touch the global allocator, in debug builds too.

#![cfg(not(miri))] // Miri replaces the global allocator, so cannot be used here.
#![allow(
    missing_docs,
    reason = "No need for API documentation in test code"
)]

use std::hint::black_box;

use alloc_tracker::{Allocator, Session};
use fixed_pool::FixedPool;

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

const CAPACITY: usize = 100_000;
const OPERATIONS: u64 = 1000;

#[test]
fn claim_and_reclaim_do_not_allocate() {
    let session = Session::new();

    let mut pool = FixedPool::<u64>::new(CAPACITY).unwrap();

    // Warm up once so that any lazy one-time setup on first use is not measured.
    let warmup = pool.claim(0).unwrap();
    pool.reclaim(warmup).unwrap();

    let mut claimed = Vec::with_capacity(usize::try_from(OPERATIONS).unwrap());

    let operation = session.operation("claim_reclaim");
    {
        let _span = operation.measure_thread();

        for value in 0..OPERATIONS {
            claimed.push(pool.claim(black_box(value)).unwrap());
        }

        for item in claimed.drain(..) {
            pool.reclaim(item).unwrap();
        }
    }

    assert_eq!(operation.total_bytes_allocated(), 0);
    assert!(pool.is_empty());
}

#[test]
fn teardown_of_full_pool_does_not_allocate() {
    let session = Session::new();

    let mut pool = FixedPool::<u64>::new(1000).unwrap();
    while pool.claim(1).is_ok() {}

    let operation = session.operation("teardown");
    {
        let _span = operation.measure_thread();

        drop(black_box(pool));
    }

    assert_eq!(operation.total_bytes_allocated(), 0);
}
