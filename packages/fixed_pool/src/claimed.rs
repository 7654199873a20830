use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;

/// Exclusive handle to an item claimed from a [`FixedPool`][crate::FixedPool].
///
/// A `Claimed<T>` is what the pool hands out in place of a reference: it remembers which pool
/// issued it, which slot the item lives in and where that slot is in memory. It cannot be copied
/// or cloned, and returning the item to the pool consumes the handle, so the same claim cannot be
/// reclaimed twice.
///
/// The handle does not borrow the pool. Access the item through the pool with
/// [`get()`][crate::FixedPool::get] and [`get_mut()`][crate::FixedPool::get_mut], or through
/// [`ptr()`][Self::ptr] from unsafe code.
///
/// # Examples
///
/// ```
/// use fixed_pool::FixedPool;
///
/// let mut pool = FixedPool::<String>::new(2).unwrap();
///
/// let greeting = pool.claim("Hello".to_string()).unwrap();
/// pool.get_mut(&greeting).unwrap().push_str(", World!");
/// assert_eq!(pool.get(&greeting).unwrap(), "Hello, World!");
///
/// pool.reclaim(greeting).unwrap();
/// assert!(pool.is_empty());
/// ```
pub struct Claimed<T> {
    pub(crate) pool_id: u64,

    pub(crate) index: usize,

    pub(crate) ptr: NonNull<T>,
}

impl<T> Claimed<T> {
    pub(crate) fn new(pool_id: u64, index: usize, ptr: NonNull<T>) -> Self {
        Self {
            pool_id,
            index,
            ptr,
        }
    }

    /// Returns a pointer to the claimed item.
    ///
    /// The pointer stays valid until the item is reclaimed or the pool is dropped, even if the
    /// pool itself is moved. The pool does not create references to the item on its own, so
    /// unsafe code may create references from this pointer as long as it does not also ask the
    /// pool for a conflicting one via `get()` or `get_mut()`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<u64>::new(1).unwrap();
    /// let item = pool.claim(7).unwrap();
    ///
    /// // SAFETY: The item is live and no other reference to it exists.
    /// let value = unsafe { item.ptr().read() };
    /// assert_eq!(value, 7);
    /// # pool.reclaim(item).unwrap();
    /// ```
    #[must_use]
    #[inline]
    pub fn ptr(&self) -> NonNull<T> {
        self.ptr
    }

    /// The index of the slot holding the item.
    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> fmt::Debug for Claimed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claimed")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("pool_id", &self.pool_id)
            .field("index", &self.index)
            .field("ptr", &self.ptr)
            .finish()
    }
}

// SAFETY: The handle is only a token plus a pointer. Moving it to another thread moves the
// ability to reach a `T` through the pool, which is fine when `T` itself may move threads.
unsafe impl<T: Send> Send for Claimed<T> {}

// SAFETY: Sharing the handle only shares its `ptr()`, which can be used to reach a `&T`, so this
// is fine when `T` itself may be shared between threads.
unsafe impl<T: Sync> Sync for Claimed<T> {}
