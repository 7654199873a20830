//! A fixed-capacity object pool with constant-time claim and reclaim.
//!
//! This crate provides [`FixedPool`], a pool that allocates storage for a fixed number of items
//! up front and then hands out slots of that storage without ever touching the global allocator
//! again. It is meant for hot paths that create and destroy many short-lived objects of one type
//! and want predictable memory use and allocation cost.
//!
//! # Key Features
//!
//! - **Fixed capacity**: All storage is allocated once when the pool is created
//! - **Constant-time claim and reclaim**: Vacant slots are kept on a free-list
//! - **Most-recently-freed reuse**: The last reclaimed slot is the next one claimed
//! - **Stable memory addresses**: Items never move, even when the pool itself is moved
//! - **Validated handles**: Reclaiming a handle from another pool or a vacant slot is an error,
//!   not undefined behavior
//! - **Bulk teardown**: Dropping the pool drops every outstanding item exactly once
//! - **Flexible drop policies**: Configure whether outstanding items at teardown are acceptable
//! - **Thread mobility**: The pool can be moved between threads (but not shared without
//!   synchronization)
//!
//! The raw storage underneath the pool is also available on its own as [`RawStorage`], for
//! callers that want to track object lifetimes themselves.
//!
//! # Examples
//!
//! ## Claiming and reclaiming
//!
//! ```rust
//! use fixed_pool::FixedPool;
//!
//! let mut pool = FixedPool::<String>::new(3).unwrap();
//!
//! let item = pool.claim("Hello".to_string()).unwrap();
//! pool.get_mut(&item).unwrap().push_str(", World!");
//! assert_eq!(pool.get(&item).unwrap(), "Hello, World!");
//!
//! // Reclaiming consumes the handle, so it cannot be reclaimed twice.
//! pool.reclaim(item).unwrap();
//! assert!(pool.is_empty());
//! ```
//!
//! ## Handling exhaustion
//!
//! ```rust
//! use fixed_pool::{Error, FixedPool};
//!
//! let mut pool = FixedPool::<u32>::new(1).unwrap();
//!
//! let first = pool.claim(1).unwrap();
//!
//! match pool.claim(2) {
//!     Err(Error::PoolExhausted { capacity, .. }) => assert_eq!(capacity, 1),
//!     other => panic!("expected exhaustion, got {other:?}"),
//! }
//!
//! pool.reclaim(first).unwrap();
//! assert!(pool.claim(2).is_ok());
//! ```
//!
//! ## Moving the pool
//!
//! ```rust
//! use fixed_pool::FixedPool;
//!
//! let mut pool = FixedPool::<u64>::new(4).unwrap();
//! let item = pool.claim(42).unwrap();
//!
//! let mut moved = std::mem::take(&mut pool);
//! assert_eq!(pool.capacity(), 0);
//!
//! // Handles keep working with the pool they were moved into.
//! assert_eq!(*moved.get(&item).unwrap(), 42);
//! moved.reclaim(item).unwrap();
//! ```

mod builder;
mod claimed;
mod drop_policy;
mod error;
mod occupancy;
mod pool;
mod raw_storage;

pub use builder::*;
pub use claimed::Claimed;
pub use drop_policy::*;
pub use error::*;
pub(crate) use occupancy::*;
pub use pool::FixedPool;
pub use raw_storage::RawStorage;
