//! Basic benchmarks for the `fixed_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use fixed_pool::FixedPool;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;

const SMALL_CAPACITY: usize = 16;
const LARGE_CAPACITY: usize = 10_000;

fn new_pools(count: u64, capacity: usize) -> Vec<FixedPool<TestItem>> {
    iter::repeat_with(|| FixedPool::new(capacity).unwrap())
        .take(usize::try_from(count).unwrap())
        .collect()
}

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("fp_basic");

    let allocs_op = allocs.operation("build_small");
    group.bench_function("build_small", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(FixedPool::<TestItem>::new(SMALL_CAPACITY)));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("claim_one");
    group.bench_function("claim_one", |b| {
        b.iter_custom(|iters| {
            let mut pools = new_pools(iters, SMALL_CAPACITY);

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for pool in &mut pools {
                _ = black_box(pool.claim(black_box(TEST_VALUE)));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("read_one");
    group.bench_function("read_one", |b| {
        b.iter_custom(|iters| {
            let mut pool = FixedPool::<TestItem>::new(SMALL_CAPACITY).unwrap();
            let item = pool.claim(TEST_VALUE).unwrap();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                _ = black_box(pool.get(black_box(&item)));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("reclaim_one");
    group.bench_function("reclaim_one", |b| {
        b.iter_custom(|iters| {
            let mut pools = new_pools(iters, SMALL_CAPACITY);

            let items = pools
                .iter_mut()
                .map(|pool| pool.claim(TEST_VALUE).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for (pool, item) in pools.iter_mut().zip(items) {
                _ = black_box(pool.reclaim(item));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("claim_reclaim_cycle");
    group.bench_function("claim_reclaim_cycle", |b| {
        b.iter_custom(|iters| {
            let mut pool = FixedPool::<TestItem>::new(SMALL_CAPACITY).unwrap();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let item = pool.claim(black_box(TEST_VALUE)).unwrap();
                _ = black_box(pool.reclaim(item));
            }

            start.elapsed()
        });
    });

    group.finish();

    let mut group = c.benchmark_group("fp_slow");

    let allocs_op = allocs.operation("claim_10k");
    group.bench_function("claim_10k", |b| {
        b.iter_custom(|iters| {
            let mut pools = new_pools(iters, LARGE_CAPACITY);

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for pool in &mut pools {
                for _ in 0..LARGE_CAPACITY {
                    _ = black_box(pool.claim(black_box(TEST_VALUE)));
                }
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("forward_10_back_5_times_1000");
    group.bench_function("forward_10_back_5_times_1000", |b| {
        // We claim 10 items, reclaim the first 5 and repeat this 1000 times.
        // This stresses the free-list bookkeeping while the pool fills up.
        b.iter_custom(|iters| {
            let mut pools = new_pools(iters, LARGE_CAPACITY);

            let mut to_reclaim = Vec::with_capacity(5);

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for pool in &mut pools {
                for _ in 0..1000 {
                    to_reclaim.clear();

                    // Claim the 5 that we will later reclaim.
                    for _ in 0..5 {
                        to_reclaim.push(pool.claim(black_box(TEST_VALUE)).unwrap());
                    }

                    // Claim the 5 that we will keep.
                    for _ in 0..5 {
                        _ = black_box(pool.claim(black_box(TEST_VALUE)));
                    }

                    // Reclaim the first 5.
                    #[expect(clippy::iter_with_drain, reason = "to avoid moving the value")]
                    for item in to_reclaim.drain(..) {
                        _ = black_box(pool.reclaim(item));
                    }
                }
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("teardown_full_10k");
    group.bench_function("teardown_full_10k", |b| {
        b.iter_custom(|iters| {
            let mut pools = new_pools(iters, LARGE_CAPACITY);

            for pool in &mut pools {
                while pool.claim(TEST_VALUE).is_ok() {}
            }

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            drop(black_box(pools));

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
