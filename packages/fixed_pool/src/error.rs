use thiserror::Error;

/// Errors that can occur when creating or operating a [`FixedPool`][crate::FixedPool].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The backing storage could not be allocated, either because the requested size overflows
    /// the address space or because the allocator refused the request.
    #[error("failed to allocate storage for {capacity} items of {item_type}")]
    Allocation {
        /// Name of the item type the storage was meant for.
        item_type: &'static str,

        /// The number of items requested.
        capacity: usize,
    },

    /// Every slot of the pool is already claimed. The caller may reclaim an item and try again.
    #[error("pool of {capacity} items of {item_type} is exhausted")]
    PoolExhausted {
        /// Name of the item type stored in the pool.
        item_type: &'static str,

        /// The fixed capacity of the pool.
        capacity: usize,
    },

    /// A handle passed to a reclaim operation does not refer to a live item of this pool.
    ///
    /// This always indicates a programming error in the caller. The pool state is unchanged.
    #[error("invalid reclaim: {0}")]
    InvalidReclaim(HandleFault),

    /// A handle used to access an item does not refer to a live item of this pool.
    #[error("invalid handle: {0}")]
    InvalidHandle(HandleFault),

    /// A slot index was beyond the capacity of the storage.
    #[error("slot index {index} is out of range for storage of capacity {capacity}")]
    OutOfRange {
        /// The requested slot index.
        index: usize,

        /// The capacity of the storage.
        capacity: usize,
    },
}

/// Explains why a [`Claimed`][crate::Claimed] handle was rejected by a pool.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum HandleFault {
    /// The handle was issued by a different pool.
    #[error("handle was issued by pool {handle_pool_id}, not by pool {pool_id}")]
    ForeignPool {
        /// Identity of the pool that issued the handle.
        handle_pool_id: u64,

        /// Identity of the pool the handle was presented to.
        pool_id: u64,
    },

    /// The address carried by the handle does not map to its slot within the pool's storage.
    #[error("handle for slot {index} points outside the pool's storage")]
    OutsideStorage {
        /// The slot index recorded in the handle.
        index: usize,
    },

    /// The slot does not currently hold a live item.
    #[error("slot {index} does not hold a live item")]
    NotInUse {
        /// The slot index recorded in the handle.
        index: usize,
    },
}

/// A specialized `Result` type for pool operations, returning the crate's [`Error`] type as the
/// error value.
pub type Result<T> = std::result::Result<T, Error>;
