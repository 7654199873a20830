//! Basic usage example for `FixedPool`.
//!
//! This example demonstrates claiming items from a pool of fixed capacity, what happens when the
//! pool runs out of slots and how reclaimed slots are reused.
//!
//! The pool reports what it does through `tracing` events, which are printed to stderr here.

use fixed_pool::{Error, FixedPool};
use tracing::Level;

#[derive(Debug, Default)]
struct Connection {
    id: u32,
    bytes_sent: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_writer(std::io::stderr)
        .init();

    let mut pool = FixedPool::<Connection>::new(3).unwrap();

    println!("Created FixedPool with capacity: {}", pool.capacity());

    let first = pool
        .claim_with(|| Connection {
            id: 1,
            bytes_sent: 0,
        })
        .unwrap();
    let second = pool
        .claim(Connection {
            id: 2,
            bytes_sent: 0,
        })
        .unwrap();
    let third = pool.claim_default().unwrap();

    println!(
        "Claimed 3 items, {} free and {} used",
        pool.free_count(),
        pool.used_count()
    );

    pool.get_mut(&second).unwrap().bytes_sent += 1500;
    println!("Connection 2: {:?}", pool.get(&second).unwrap());

    match pool.claim_default() {
        Err(Error::PoolExhausted { capacity, .. }) => {
            println!("Fourth claim failed, all {capacity} slots are in use");
        }
        other => panic!("expected the pool to be exhausted, got {other:?}"),
    }

    let freed_slot = second.index();
    pool.reclaim(second).unwrap();
    println!("Reclaimed connection 2 from slot {freed_slot}");

    let fourth = pool
        .claim(Connection {
            id: 4,
            bytes_sent: 0,
        })
        .unwrap();
    println!(
        "Claimed connection {} into slot {} (the slot that was just freed)",
        pool.get(&fourth).unwrap().id,
        fourth.index()
    );
    assert_eq!(fourth.index(), freed_slot);

    let connection = pool.reclaim_into_inner(first).unwrap();
    println!("Took connection {} out of the pool", connection.id);

    pool.reclaim(third).unwrap();
    pool.reclaim(fourth).unwrap();

    println!(
        "Pool is empty again: {} free and {} used",
        pool.free_count(),
        pool.used_count()
    );
}
