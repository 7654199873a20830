//! End-to-end scenarios exercising the public API of `fixed_pool`.
#![allow(
    missing_docs,
    clippy::indexing_slicing,
    reason = "No need for API documentation or panic-free indexing in test code"
)]

use std::cell::Cell;
use std::mem;
use std::rc::Rc;

use fixed_pool::{Claimed, DropPolicy, Error, FixedPool, HandleFault};

#[derive(Debug, Default, PartialEq)]
struct Particle {
    position: (f32, f32),
    velocity: (f32, f32),
    ttl: u32,
}

/// Records every drop in a shared counter so teardown behavior can be observed.
#[derive(Debug)]
struct Tracked {
    drops: Rc<Cell<usize>>,
}

impl Tracked {
    fn new(drops: &Rc<Cell<usize>>) -> Self {
        Self {
            drops: Rc::clone(drops),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

fn assert_counts<T>(pool: &FixedPool<T>, free: usize, used: usize) {
    assert_eq!(pool.free_count(), free, "free count");
    assert_eq!(pool.used_count(), used, "used count");
    assert_eq!(pool.free_count() + pool.used_count(), pool.capacity());
}

#[test]
fn capacity_three_exhaust_and_recover() {
    let mut pool = FixedPool::<Particle>::new(3).unwrap();

    let a = pool.claim_default().unwrap();
    let b = pool.claim_default().unwrap();
    let c = pool.claim_default().unwrap();
    assert_counts(&pool, 0, 3);

    let fourth = pool.claim_default();
    assert!(matches!(
        fourth,
        Err(Error::PoolExhausted { capacity: 3, .. })
    ));
    assert_counts(&pool, 0, 3);

    let b_ptr = b.ptr();
    pool.reclaim(b).unwrap();
    assert_counts(&pool, 1, 2);

    let d = pool.claim_default().unwrap();
    assert_eq!(d.ptr(), b_ptr);
    assert_counts(&pool, 0, 3);

    for handle in [a, c, d] {
        pool.reclaim(handle).unwrap();
    }
    assert_counts(&pool, 3, 0);
}

#[test]
fn sum_invariant_holds_through_mixed_workload() {
    let mut pool = FixedPool::<u64>::new(16).unwrap();
    let mut live: Vec<Claimed<u64>> = Vec::new();

    // A deterministic pseudo-random sequence of claims and reclaims.
    let mut state = 0x2545_f491_u64;
    for _ in 0..2000 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;

        if state % 3 != 0 && !pool.is_full() {
            live.push(pool.claim(state).unwrap());
        } else if let Some(handle) = live.pop() {
            let expected = *pool.get(&handle).unwrap();
            assert_eq!(pool.reclaim_into_inner(handle).unwrap(), expected);
        }

        assert_eq!(pool.free_count() + pool.used_count(), pool.capacity());
        assert_eq!(pool.used_count(), live.len());
    }

    for handle in live {
        pool.reclaim(handle).unwrap();
    }
    assert!(pool.is_empty());
}

#[test]
fn round_trip_yields_fresh_default() {
    let mut pool = FixedPool::<Particle>::new(1).unwrap();

    let particle = pool.claim_default().unwrap();
    *pool.get_mut(&particle).unwrap() = Particle {
        position: (1.0, 2.0),
        velocity: (3.0, 4.0),
        ttl: 99,
    };
    pool.reclaim(particle).unwrap();

    let particle = pool.claim_default().unwrap();
    assert_eq!(*pool.get(&particle).unwrap(), Particle::default());
    pool.reclaim(particle).unwrap();
}

#[test]
fn foreign_handle_is_rejected_without_side_effects() {
    let mut pool_a = FixedPool::<String>::new(2).unwrap();
    let mut pool_b = FixedPool::<String>::new(2).unwrap();

    let from_a = pool_a.claim("a".to_string()).unwrap();
    let from_b = pool_b.claim("b".to_string()).unwrap();

    let error = pool_b.reclaim(from_a).unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidReclaim(HandleFault::ForeignPool { .. })
    ));
    assert!(error.to_string().starts_with("invalid reclaim"));

    assert_counts(&pool_a, 1, 1);
    assert_counts(&pool_b, 1, 1);
    assert_eq!(pool_b.get(&from_b).unwrap(), "b");

    pool_b.reclaim(from_b).unwrap();
}

#[test]
fn moved_pool_keeps_handles_and_counts() {
    let mut source = FixedPool::<u32>::new(4).unwrap();
    let first = source.claim(1).unwrap();
    let second = source.claim(2).unwrap();

    let mut destination = mem::take(&mut source);

    assert_eq!(source.capacity(), 0);
    assert_counts(&source, 0, 0);
    assert_counts(&destination, 2, 2);

    assert!(source.reclaim(first).is_err());

    // The rejected handle was consumed, but the item is still owned by the destination pool.
    assert_counts(&destination, 2, 2);
    assert_eq!(*destination.get(&second).unwrap(), 2);
    destination.reclaim(second).unwrap();
    assert_counts(&destination, 3, 1);
}

#[test]
fn teardown_runs_exactly_one_destructor() {
    let drops = Rc::new(Cell::new(0));

    let mut pool = FixedPool::<Tracked>::new(3).unwrap();
    let a = pool.claim(Tracked::new(&drops)).unwrap();
    let b = pool.claim(Tracked::new(&drops)).unwrap();
    let _c = pool.claim(Tracked::new(&drops)).unwrap();

    pool.reclaim(a).unwrap();
    pool.reclaim(b).unwrap();
    let reclaimed = drops.get();

    drop(pool);
    assert_eq!(drops.get() - reclaimed, 1);
}

#[test]
fn teardown_of_untouched_pool_runs_no_destructors() {
    let drops = Rc::new(Cell::new(0));

    {
        let _pool = FixedPool::<Tracked>::new(128).unwrap();
    }

    assert_eq!(drops.get(), 0);
}

#[test]
fn reassignment_tears_down_previous_pool() {
    let drops = Rc::new(Cell::new(0));

    let mut pool = FixedPool::<Tracked>::new(2).unwrap();
    let _first = pool.claim(Tracked::new(&drops)).unwrap();

    pool = FixedPool::new(5).unwrap();

    assert_eq!(drops.get(), 1);
    assert_eq!(pool.capacity(), 5);
    assert!(pool.is_empty());
}

#[test]
fn builder_policy_panics_on_outstanding_items() {
    let result = std::panic::catch_unwind(|| {
        let mut pool = FixedPool::<u8>::builder()
            .capacity(1)
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        _ = pool.claim(1).unwrap();
    });

    assert!(result.is_err());
}

#[test]
fn capacity_zero_pool_behaves() {
    let mut pool = FixedPool::<Particle>::new(0).unwrap();

    assert_counts(&pool, 0, 0);
    assert!(matches!(
        pool.claim_default(),
        Err(Error::PoolExhausted { capacity: 0, .. })
    ));
}

#[test]
fn errors_render_readable_messages() {
    let mut pool = FixedPool::<u16>::new(0).unwrap();
    let error = pool.claim(1).unwrap_err();

    assert_eq!(error.to_string(), "pool of 0 items of u16 is exhausted");
}
