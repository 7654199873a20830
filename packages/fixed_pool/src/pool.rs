use std::any::type_name;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::{fmt, thread};

use tracing::{debug, trace, warn};

use crate::{
    Claimed, DropPolicy, Error, FixedPoolBuilder, HandleFault, Occupancy, RawStorage, Result,
};

/// Global counter for generating unique pool IDs.
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique pool ID.
fn generate_pool_id() -> u64 {
    POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// An object pool with a fixed capacity that hands out and takes back slots in constant time.
///
/// All storage is allocated when the pool is created. Claiming an item constructs it in a vacant
/// slot and returns a [`Claimed<T>`] handle; reclaiming the handle drops the item and makes the
/// slot available again. Neither operation touches the global allocator.
///
/// Items never move while they are in the pool, even when the pool itself is moved, so handles
/// and the pointers they carry stay valid until the item is reclaimed or the pool is dropped.
///
/// # Slot reuse
///
/// A fresh pool hands out slots in order, starting from slot 0. After that, the most recently
/// reclaimed slot is always the next one to be claimed.
///
/// # Teardown
///
/// Dropping the pool drops every item that is still claimed, exactly once, and never touches
/// vacant slots. If nothing is claimed, teardown does no per-slot work at all. Whether dropping
/// claimed items is acceptable is governed by the pool's [`DropPolicy`].
///
/// # Moving the pool
///
/// `std::mem::take(&mut pool)` moves the pool out and leaves an empty pool of capacity zero
/// behind. Handles issued before the move keep working with the moved-to pool.
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) when `T` is, but it is not thread-safe ([`Sync`]).
/// Wrap it in a `Mutex` to share it between threads.
///
/// # Examples
///
/// ```
/// use fixed_pool::{Error, FixedPool};
///
/// let mut pool = FixedPool::<u64>::new(2).unwrap();
///
/// let a = pool.claim(1).unwrap();
/// let b = pool.claim(2).unwrap();
/// assert_eq!(pool.free_count(), 0);
///
/// assert!(matches!(pool.claim(3), Err(Error::PoolExhausted { .. })));
///
/// pool.reclaim(a).unwrap();
/// let c = pool.claim(3).unwrap();
/// assert_eq!(*pool.get(&c).unwrap(), 3);
/// # pool.reclaim(b).unwrap();
/// # pool.reclaim(c).unwrap();
/// ```
pub struct FixedPool<T> {
    /// Identifies the pool so that handles issued by a different pool can be rejected.
    /// Moves along with the pool.
    pool_id: u64,

    storage: RawStorage<T>,

    /// Stack of vacant slot indexes. The top of the stack is the next slot to be claimed.
    /// Allocated up front with room for every slot, so pushing never reallocates.
    free_list: Vec<usize>,

    /// Marks the slots that hold a live item. Always the exact complement of `free_list`.
    occupancy: Occupancy,

    drop_policy: DropPolicy,

    /// The pool owns the items in its occupied slots and drops them.
    _items: PhantomData<T>,
}

impl<T> FixedPool<T> {
    /// Creates a pool with room for `capacity` items and the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the storage cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let pool = FixedPool::<String>::new(3).unwrap();
    ///
    /// assert_eq!(pool.capacity(), 3);
    /// assert_eq!(pool.free_count(), 3);
    /// assert_eq!(pool.used_count(), 0);
    /// ```
    pub fn new(capacity: usize) -> Result<Self> {
        Self::builder().capacity(capacity).build()
    }

    /// Starts building a new [`FixedPool`].
    ///
    /// Use this when you want to customize the pool configuration beyond the defaults.
    pub fn builder() -> FixedPoolBuilder<T> {
        FixedPoolBuilder::new()
    }

    pub(crate) fn new_inner(capacity: usize, drop_policy: DropPolicy) -> Result<Self> {
        let storage = RawStorage::new(capacity)?;

        let mut free_list = Vec::new();
        if free_list.try_reserve_exact(capacity).is_err() {
            return Err(Error::Allocation {
                item_type: type_name::<T>(),
                capacity,
            });
        }

        // Seeded in reverse, so slot 0 ends up on top of the stack and is claimed first.
        free_list.extend((0..capacity).rev());

        let pool_id = generate_pool_id();

        debug!(
            item_type = type_name::<T>(),
            pool_id,
            capacity,
            ?drop_policy,
            "created fixed pool"
        );

        Ok(Self {
            pool_id,
            storage,
            free_list,
            occupancy: Occupancy::new(capacity),
            drop_policy,
            _items: PhantomData,
        })
    }

    /// The total number of slots in the pool. This never changes.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// The number of vacant slots.
    #[must_use]
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// The number of claimed items currently in the pool.
    #[must_use]
    #[inline]
    pub fn used_count(&self) -> usize {
        // Cannot underflow: the free-list never holds more entries than there are slots.
        self.capacity().wrapping_sub(self.free_count())
    }

    /// Whether no items are currently claimed.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free_count() == self.capacity()
    }

    /// Whether every slot is claimed, meaning the next claim will fail.
    #[must_use]
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_list.is_empty()
    }

    /// The drop policy the pool was created with.
    #[must_use]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// Whether the address is the start of one of this pool's slots, claimed or not.
    ///
    /// This is offset arithmetic against the pool's storage and never dereferences the pointer.
    #[must_use]
    pub fn contains(&self, ptr: *const T) -> bool {
        self.storage.contains(ptr)
    }

    /// Moves `value` into a vacant slot and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if every slot is already claimed. The value is dropped
    /// in that case and the pool is left unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<String>::new(1).unwrap();
    ///
    /// let item = pool.claim("pooled".to_string()).unwrap();
    /// assert_eq!(pool.get(&item).unwrap(), "pooled");
    /// assert_eq!(pool.used_count(), 1);
    /// # pool.reclaim(item).unwrap();
    /// ```
    pub fn claim(&mut self, value: T) -> Result<Claimed<T>> {
        self.claim_with(|| value)
    }

    /// Constructs an item in a vacant slot from the value returned by `f` and returns a handle
    /// to it.
    ///
    /// The closure is the place to capture constructor arguments. It is not called if the pool
    /// is exhausted. If it panics, the pool is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if every slot is already claimed.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<Vec<u8>>::new(1).unwrap();
    ///
    /// let buffer_size = 512;
    /// let buffer = pool.claim_with(|| Vec::with_capacity(buffer_size)).unwrap();
    /// assert!(pool.get(&buffer).unwrap().capacity() >= 512);
    /// # pool.reclaim(buffer).unwrap();
    /// ```
    pub fn claim_with(&mut self, f: impl FnOnce() -> T) -> Result<Claimed<T>> {
        // SAFETY: The closure writes a complete value into the slot.
        unsafe {
            self.claim_in_place(|slot: &mut MaybeUninit<T>| {
                slot.write(f());
            })
        }
    }

    /// Constructs a default-valued item in a vacant slot and returns a handle to it.
    ///
    /// The item is always freshly constructed, so nothing written by a previous occupant of
    /// the slot is observable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if every slot is already claimed.
    pub fn claim_default(&mut self) -> Result<Claimed<T>>
    where
        T: Default,
    {
        self.claim_with(T::default)
    }

    /// Claims a vacant slot and lets `f` initialize the item in place.
    ///
    /// This allows constructing an item directly in pool storage, without first building it
    /// elsewhere and moving it in. The closure is not called if the pool is exhausted. If it
    /// panics, the pool is left unchanged and nothing is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if every slot is already claimed.
    ///
    /// # Safety
    ///
    /// The closure must fully initialize the `MaybeUninit<T>` before returning.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::mem::MaybeUninit;
    ///
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<[u64; 64]>::new(1).unwrap();
    ///
    /// // SAFETY: The closure initializes the whole array.
    /// let table = unsafe {
    ///     pool.claim_in_place(|slot: &mut MaybeUninit<[u64; 64]>| {
    ///         slot.write([7; 64]);
    ///     })
    /// }
    /// .unwrap();
    ///
    /// assert_eq!(pool.get(&table).unwrap()[63], 7);
    /// # pool.reclaim(table).unwrap();
    /// ```
    pub unsafe fn claim_in_place(
        &mut self,
        f: impl FnOnce(&mut MaybeUninit<T>),
    ) -> Result<Claimed<T>> {
        let Some(&index) = self.free_list.last() else {
            return Err(self.exhausted());
        };

        let mut slot = self.storage.slot_ptr(index)?;

        // SAFETY: The slot is on the free-list, so it holds no live item and nothing references
        // it. It is valid for writes of `T` because it came from our own storage.
        f(unsafe { slot.as_mut() });

        // Only now that initialization has succeeded do we commit the claim, so a panicking
        // initializer leaves the slot vacant.
        let popped = self.free_list.pop();
        debug_assert_eq!(popped, Some(index));

        self.occupancy.set_occupied(index);

        trace!(index, pool_id = self.pool_id, "claimed slot");

        #[cfg(debug_assertions)]
        self.check_slot(index, true);

        Ok(Claimed::new(self.pool_id, index, slot.cast::<T>()))
    }

    fn exhausted(&self) -> Error {
        debug!(
            item_type = type_name::<T>(),
            pool_id = self.pool_id,
            capacity = self.capacity(),
            "claim rejected, pool is exhausted"
        );

        Error::PoolExhausted {
            item_type: type_name::<T>(),
            capacity: self.capacity(),
        }
    }

    /// Drops the item and returns its slot to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReclaim`] if the handle was issued by a different pool or does
    /// not refer to a live item in this pool's storage. The pool is left unchanged.
    ///
    /// A rejected handle is still consumed. If it belonged to another pool, its item stays
    /// claimed in that pool until the pool is dropped. Use [`get()`][Self::get] to check a
    /// handle without giving it up.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<String>::new(1).unwrap();
    ///
    /// let item = pool.claim("short-lived".to_string()).unwrap();
    /// assert!(pool.is_full());
    ///
    /// pool.reclaim(item).unwrap();
    /// assert!(pool.is_empty());
    /// ```
    #[allow(
        clippy::needless_pass_by_value,
        reason = "Claimed must be consumed to prevent reuse"
    )]
    pub fn reclaim(&mut self, claimed: Claimed<T>) -> Result<()> {
        let index = self
            .validate(&claimed)
            .map_err(|fault| self.reject_reclaim(fault))?;

        // Bookkeeping goes first. Even if the destructor panics, the item counts as dropped and
        // the slot must not be dropped again at teardown.
        self.release(index);

        // SAFETY: The handle was validated to point at a live item in our storage. The handle is
        // consumed and the slot is now vacant, so nothing will access or drop the item again.
        unsafe {
            ptr::drop_in_place(claimed.ptr.as_ptr());
        }

        Ok(())
    }

    /// Moves the item out of the pool and returns its slot to the pool, without dropping the item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReclaim`] if the handle was issued by a different pool or does
    /// not refer to a live item in this pool's storage. The pool is left unchanged. As with
    /// [`reclaim()`][Self::reclaim], a rejected handle is consumed.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<String>::new(1).unwrap();
    ///
    /// let item = pool.claim("keep me".to_string()).unwrap();
    /// let value = pool.reclaim_into_inner(item).unwrap();
    ///
    /// assert_eq!(value, "keep me");
    /// assert!(pool.is_empty());
    /// ```
    #[allow(
        clippy::needless_pass_by_value,
        reason = "Claimed must be consumed to prevent reuse"
    )]
    pub fn reclaim_into_inner(&mut self, claimed: Claimed<T>) -> Result<T> {
        let index = self
            .validate(&claimed)
            .map_err(|fault| self.reject_reclaim(fault))?;

        // SAFETY: The handle was validated to point at a live item in our storage. We mark the
        // slot vacant right after, so the moved-out value is never dropped by the pool.
        let value = unsafe { claimed.ptr.read() };

        self.release(index);

        Ok(value)
    }

    fn release(&mut self, index: usize) {
        self.occupancy.set_vacant(index);

        // Never reallocates: the free-list was sized for every slot.
        self.free_list.push(index);

        trace!(index, pool_id = self.pool_id, "reclaimed slot");

        #[cfg(debug_assertions)]
        self.check_slot(index, false);
    }

    fn reject_reclaim(&self, fault: HandleFault) -> Error {
        warn!(
            item_type = type_name::<T>(),
            pool_id = self.pool_id,
            %fault,
            "rejected reclaim"
        );

        Error::InvalidReclaim(fault)
    }

    /// Returns a shared reference to a claimed item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle was issued by a different pool or does
    /// not refer to a live item in this pool's storage.
    pub fn get(&self, claimed: &Claimed<T>) -> Result<&T> {
        self.validate(claimed).map_err(Error::InvalidHandle)?;

        // SAFETY: The handle was validated to point at a live item in our storage. The shared
        // borrow of the pool prevents `get_mut()` and reclaims for as long as the reference lives.
        Ok(unsafe { claimed.ptr.as_ref() })
    }

    /// Returns an exclusive reference to a claimed item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle was issued by a different pool or does
    /// not refer to a live item in this pool's storage.
    pub fn get_mut(&mut self, claimed: &Claimed<T>) -> Result<&mut T> {
        self.validate(claimed).map_err(Error::InvalidHandle)?;

        let mut ptr = claimed.ptr;

        // SAFETY: The handle was validated to point at a live item in our storage. The exclusive
        // borrow of the pool prevents any other reference from being handed out meanwhile.
        Ok(unsafe { ptr.as_mut() })
    }

    /// Checks that the handle refers to a live item of this pool and returns its slot index.
    fn validate(&self, claimed: &Claimed<T>) -> std::result::Result<usize, HandleFault> {
        if claimed.pool_id != self.pool_id {
            return Err(HandleFault::ForeignPool {
                handle_pool_id: claimed.pool_id,
                pool_id: self.pool_id,
            });
        }

        if self.storage.index_of(claimed.ptr.as_ptr()) != Some(claimed.index) {
            return Err(HandleFault::OutsideStorage {
                index: claimed.index,
            });
        }

        // The containment check above guarantees the index is within capacity.
        if !self.occupancy.is_occupied(claimed.index) {
            return Err(HandleFault::NotInUse {
                index: claimed.index,
            });
        }

        Ok(claimed.index)
    }

    /// Checks the bookkeeping of a slot that just changed state. Constant time and allocation-free,
    /// so it can run after every claim and reclaim.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    fn check_slot(&self, index: usize, occupied: bool) {
        assert!(
            self.free_list.len() <= self.capacity(),
            "free-list holds {} entries but capacity is {} in pool of {}",
            self.free_list.len(),
            self.capacity(),
            type_name::<T>()
        );

        assert!(
            self.occupancy.is_occupied(index) == occupied,
            "slot {index} occupancy bit does not match its state (expected occupied: {occupied}) in pool of {}",
            type_name::<T>()
        );

        // A freshly vacated slot is on top of the free-list. A freshly claimed one just left it.
        assert!(
            (self.free_list.last() == Some(&index)) != occupied,
            "slot {index} is in the wrong place on the free-list (occupied: {occupied}) in pool of {}",
            type_name::<T>()
        );
    }

    /// Walks the whole pool to verify that the free-list and the occupancy bitmap agree.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(test)]
    pub(crate) fn integrity_check(&self) {
        let capacity = self.capacity();
        let mut seen_on_free_list = Occupancy::new(capacity);

        for &index in &self.free_list {
            assert!(
                index < capacity,
                "free-list entry {index} is beyond capacity {capacity} in pool of {}",
                type_name::<T>()
            );

            assert!(
                !self.occupancy.is_occupied(index),
                "free-list entry {index} is marked as occupied in pool of {}",
                type_name::<T>()
            );

            assert!(
                !seen_on_free_list.is_occupied(index),
                "slot {index} is on the free-list more than once in pool of {}",
                type_name::<T>()
            );

            seen_on_free_list.set_occupied(index);
        }

        let occupied = self.occupancy.count();

        assert!(
            occupied.checked_add(self.free_list.len()) == Some(capacity),
            "{occupied} occupied and {} vacant slots do not add up to capacity {capacity} in pool of {}",
            self.free_list.len(),
            type_name::<T>()
        );
    }
}

impl<T> Default for FixedPool<T> {
    /// Creates an empty pool with zero capacity. Performs no allocation.
    fn default() -> Self {
        Self {
            pool_id: generate_pool_id(),
            storage: RawStorage::empty(),
            free_list: Vec::new(),
            occupancy: Occupancy::new(0),
            drop_policy: DropPolicy::default(),
            _items: PhantomData,
        }
    }
}

impl<T> Drop for FixedPool<T> {
    fn drop(&mut self) {
        let outstanding = self.used_count();

        if outstanding > 0 {
            debug!(
                item_type = type_name::<T>(),
                pool_id = self.pool_id,
                outstanding,
                capacity = self.capacity(),
                "dropping outstanding items during pool teardown"
            );

            for index in self.occupancy.iter_occupied() {
                let slot = self
                    .storage
                    .slot_ptr(index)
                    .expect("occupied slots are always within capacity");

                // SAFETY: The slot is marked as occupied, so it holds a live item that nothing
                // else will drop. Each occupied index is visited exactly once.
                unsafe {
                    ptr::drop_in_place(slot.as_ptr().cast::<T>());
                }
            }
        }

        // The storage field is released even if we panic here. If we are already panicking, we
        // do not want to panic again because that would obscure the original panic.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                outstanding == 0,
                "dropped a pool of {} with {outstanding} claimed items - this is forbidden by DropPolicy::MustNotDropItems",
                type_name::<T>()
            );
        }
    }
}

impl<T> fmt::Debug for FixedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedPool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("pool_id", &self.pool_id)
            .field("capacity", &self.capacity())
            .field("used_count", &self.used_count())
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "test code does not need the same safety rigor as production code"
)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::mem;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::ptr::NonNull;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(FixedPool<u32>: Send, fmt::Debug, Default);
    assert_not_impl_any!(FixedPool<u32>: Sync, Clone);
    assert_not_impl_any!(FixedPool<Rc<u32>>: Send);

    /// Counts how many times instances sharing the counter have been dropped.
    struct DropCounter {
        drops: Rc<Cell<usize>>,
    }

    impl DropCounter {
        fn new(drops: &Rc<Cell<usize>>) -> Self {
            Self {
                drops: Rc::clone(drops),
            }
        }
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    fn assert_counts_consistent<T>(pool: &FixedPool<T>) {
        assert_eq!(pool.free_count() + pool.used_count(), pool.capacity());
    }

    #[test]
    fn smoke_test() {
        let mut pool = FixedPool::<u32>::new(3).unwrap();

        let a = pool.claim(42).unwrap();
        let b = pool.claim(43).unwrap();
        let c = pool.claim(44).unwrap();

        assert_eq!(*pool.get(&a).unwrap(), 42);
        assert_eq!(*pool.get(&b).unwrap(), 43);
        assert_eq!(*pool.get(&c).unwrap(), 44);
        assert_eq!(pool.used_count(), 3);

        pool.reclaim(b).unwrap();
        assert_eq!(pool.used_count(), 2);

        let d = pool.claim(45).unwrap();

        assert_eq!(*pool.get(&a).unwrap(), 42);
        assert_eq!(*pool.get(&c).unwrap(), 44);
        assert_eq!(*pool.get(&d).unwrap(), 45);
        assert!(pool.is_full());

        // We leave the rest for the pool to clean up.
    }

    #[test]
    fn fresh_pool_counts() {
        for capacity in [0, 1, 3, 64, 65, 1000] {
            let pool = FixedPool::<u64>::new(capacity).unwrap();

            assert_eq!(pool.capacity(), capacity);
            assert_eq!(pool.free_count(), capacity);
            assert_eq!(pool.used_count(), 0);
            assert!(pool.is_empty());
        }
    }

    #[test]
    fn zero_capacity_pool_always_exhausted() {
        let mut pool = FixedPool::<u64>::new(0).unwrap();

        assert!(pool.is_full());
        assert!(pool.is_empty());
        assert!(matches!(
            pool.claim(1),
            Err(Error::PoolExhausted { capacity: 0, .. })
        ));
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn claims_start_at_slot_zero() {
        let mut pool = FixedPool::<u32>::new(3).unwrap();

        let a = pool.claim(10).unwrap();
        let b = pool.claim(11).unwrap();
        let c = pool.claim(12).unwrap();

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(c.index(), 2);
    }

    #[test]
    fn most_recently_reclaimed_slot_is_reused_first() {
        let mut pool = FixedPool::<u32>::new(4).unwrap();

        let a = pool.claim(1).unwrap();
        let b = pool.claim(2).unwrap();
        let c = pool.claim(3).unwrap();

        let a_ptr = a.ptr();
        let c_ptr = c.ptr();

        pool.reclaim(a).unwrap();
        pool.reclaim(c).unwrap();

        let first = pool.claim(4).unwrap();
        let second = pool.claim(5).unwrap();
        let third = pool.claim(6).unwrap();

        assert_eq!(first.ptr(), c_ptr);
        assert_eq!(second.ptr(), a_ptr);
        assert_eq!(third.index(), 3);

        assert_eq!(*pool.get(&b).unwrap(), 2);
    }

    #[test]
    fn counts_stay_consistent_across_operations() {
        let mut pool = FixedPool::<u32>::new(5).unwrap();
        let mut claimed = Vec::new();

        for round in 0..4_u32 {
            for value in 0..(5 - claimed.len()) {
                claimed.push(pool.claim(round * 10 + value as u32).unwrap());
                assert_counts_consistent(&pool);
            }

            // Reclaim every other item.
            let mut kept = Vec::new();
            for (position, item) in claimed.into_iter().enumerate() {
                if position % 2 == 0 {
                    pool.reclaim(item).unwrap();
                    assert_counts_consistent(&pool);
                } else {
                    kept.push(item);
                }
            }
            claimed = kept;
            pool.integrity_check();
        }

        assert_eq!(pool.used_count(), claimed.len());
    }

    #[test]
    fn claim_when_exhausted_leaves_pool_unchanged() {
        let mut pool = FixedPool::<u32>::new(2).unwrap();

        let a = pool.claim(1).unwrap();
        let b = pool.claim(2).unwrap();

        let result = pool.claim(3);
        assert!(matches!(
            result,
            Err(Error::PoolExhausted { capacity: 2, .. })
        ));

        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.used_count(), 2);
        assert_eq!(*pool.get(&a).unwrap(), 1);
        assert_eq!(*pool.get(&b).unwrap(), 2);
    }

    #[test]
    fn claim_with_is_not_called_when_exhausted() {
        let mut pool = FixedPool::<u32>::new(0).unwrap();
        let called = Cell::new(false);

        let result = pool.claim_with(|| {
            called.set(true);
            5
        });

        assert!(result.is_err());
        assert!(!called.get());
    }

    #[test]
    fn panicking_initializer_leaves_pool_unchanged() {
        let mut pool = FixedPool::<String>::new(2).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| {
            _ = pool.claim_with(|| panic!("constructor failed"));
        }));

        assert!(result.is_err());
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.used_count(), 0);
        pool.integrity_check();

        // The slot that was about to be claimed is still the next one handed out.
        let item = pool.claim("recovered".to_string()).unwrap();
        assert_eq!(item.index(), 0);
        assert_eq!(pool.get(&item).unwrap(), "recovered");
    }

    #[test]
    fn claim_in_place_initializes_slot() {
        let mut pool = FixedPool::<(u32, u64)>::new(1).unwrap();

        let item = unsafe {
            pool.claim_in_place(|slot: &mut MaybeUninit<(u32, u64)>| {
                slot.write((1, 2));
            })
        }
        .unwrap();

        assert_eq!(*pool.get(&item).unwrap(), (1, 2));
    }

    #[test]
    fn claim_default_yields_fresh_value_after_reuse() {
        let mut pool = FixedPool::<u64>::new(1).unwrap();

        let item = pool.claim_default().unwrap();
        *pool.get_mut(&item).unwrap() = 0xdead_beef;
        pool.reclaim(item).unwrap();

        let item = pool.claim_default().unwrap();
        assert_eq!(*pool.get(&item).unwrap(), 0);
    }

    #[test]
    fn get_mut_writes_through() {
        let mut pool = FixedPool::<Vec<u32>>::new(2).unwrap();

        let item = pool.claim(vec![1]).unwrap();
        pool.get_mut(&item).unwrap().push(2);

        assert_eq!(pool.get(&item).unwrap(), &vec![1, 2]);
        assert_eq!(unsafe { item.ptr().as_ref() }, &vec![1, 2]);
    }

    #[test]
    fn reclaim_drops_item() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = FixedPool::<DropCounter>::new(2).unwrap();

        let item = pool.claim(DropCounter::new(&drops)).unwrap();
        assert_eq!(drops.get(), 0);

        pool.reclaim(item).unwrap();
        assert_eq!(drops.get(), 1);

        drop(pool);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn panicking_destructor_on_reclaim_frees_slot_and_is_not_dropped_again() {
        /// Panics the first time any instance sharing the counter is dropped.
        struct PanicOnFirstDrop {
            drops: Rc<Cell<usize>>,
        }

        impl Drop for PanicOnFirstDrop {
            fn drop(&mut self) {
                self.drops.set(self.drops.get() + 1);

                assert!(self.drops.get() != 1, "first drop fails");
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut pool = FixedPool::<PanicOnFirstDrop>::new(2).unwrap();

        let a = pool
            .claim(PanicOnFirstDrop {
                drops: Rc::clone(&drops),
            })
            .unwrap();
        let _b = pool
            .claim(PanicOnFirstDrop {
                drops: Rc::clone(&drops),
            })
            .unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| pool.reclaim(a)));

        assert!(result.is_err());
        assert_eq!(drops.get(), 1);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.used_count(), 1);
        pool.integrity_check();

        // Only the remaining item is dropped at teardown.
        drop(pool);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn rejected_handle_leaves_item_with_issuing_pool() {
        let drops = Rc::new(Cell::new(0));

        let mut owner = FixedPool::<DropCounter>::new(1).unwrap();
        let mut other = FixedPool::<DropCounter>::new(1).unwrap();

        let item = owner.claim(DropCounter::new(&drops)).unwrap();

        // Checking the handle with get() does not give it up.
        assert!(other.get(&item).is_err());
        assert!(owner.get(&item).is_ok());

        // Reclaiming it into the wrong pool consumes the handle but drops nothing.
        assert!(other.reclaim(item).is_err());
        assert_eq!(drops.get(), 0);
        assert_eq!(owner.used_count(), 1);
        assert_eq!(other.used_count(), 0);

        // The item stays claimed until its pool is dropped.
        drop(other);
        assert_eq!(drops.get(), 0);
        drop(owner);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn integrity_check_passes_after_mixed_operations() {
        let mut pool = FixedPool::<u32>::new(130).unwrap();
        pool.integrity_check();

        let claimed: Vec<_> = (0..130).map(|value| pool.claim(value).unwrap()).collect();
        pool.integrity_check();

        for item in claimed.into_iter().filter(|item| item.index() % 3 == 0) {
            pool.reclaim(item).unwrap();
        }
        pool.integrity_check();

        FixedPool::<u32>::default().integrity_check();
    }

    #[test]
    fn reclaim_into_inner_does_not_drop() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = FixedPool::<DropCounter>::new(1).unwrap();

        let item = pool.claim(DropCounter::new(&drops)).unwrap();
        let value = pool.reclaim_into_inner(item).unwrap();

        assert_eq!(drops.get(), 0);
        assert!(pool.is_empty());

        drop(pool);
        assert_eq!(drops.get(), 0);

        drop(value);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn reclaim_from_different_pool_is_error() {
        let mut pool1 = FixedPool::<u32>::new(2).unwrap();
        let mut pool2 = FixedPool::<u32>::new(2).unwrap();

        let from_pool1 = pool1.claim(42).unwrap();

        // Having a live item in pool2 must not make the foreign handle acceptable.
        let _from_pool2 = pool2.claim(43).unwrap();

        let result = pool2.reclaim(from_pool1);

        assert!(matches!(
            result,
            Err(Error::InvalidReclaim(HandleFault::ForeignPool { .. }))
        ));
        assert_eq!(pool2.used_count(), 1);
        assert_eq!(pool1.used_count(), 1);
    }

    #[test]
    fn reclaim_vacant_slot_is_error() {
        let mut pool = FixedPool::<u32>::new(3).unwrap();
        let _a = pool.claim(1).unwrap();

        // Forge a handle for a vacant slot with the right pool ID and a valid address.
        let slot = pool.storage.slot_ptr(2).unwrap().cast::<u32>();
        let forged = Claimed::new(pool.pool_id, 2, slot);

        let result = pool.reclaim(forged);

        assert!(matches!(
            result,
            Err(Error::InvalidReclaim(HandleFault::NotInUse { index: 2 }))
        ));
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.used_count(), 1);
    }

    #[test]
    fn reclaim_address_outside_storage_is_error() {
        let mut pool = FixedPool::<u32>::new(3).unwrap();
        let _a = pool.claim(1).unwrap();

        let mut elsewhere = 5_u32;
        let forged = Claimed::new(pool.pool_id, 0, NonNull::from(&mut elsewhere));

        let result = pool.reclaim(forged);

        assert!(matches!(
            result,
            Err(Error::InvalidReclaim(HandleFault::OutsideStorage { index: 0 }))
        ));
        assert_eq!(pool.used_count(), 1);
        assert_eq!(elsewhere, 5);
    }

    #[test]
    fn reclaim_mismatched_index_is_error() {
        let mut pool = FixedPool::<u32>::new(3).unwrap();
        let a = pool.claim(1).unwrap();

        // Right pool, live slot address, but the index claims to be a different slot.
        let forged = Claimed::new(pool.pool_id, 1, a.ptr());

        assert!(matches!(
            pool.reclaim(forged),
            Err(Error::InvalidReclaim(HandleFault::OutsideStorage { index: 1 }))
        ));
        assert_eq!(pool.used_count(), 1);
    }

    #[test]
    fn get_with_foreign_handle_is_error() {
        let mut pool1 = FixedPool::<u32>::new(1).unwrap();
        let pool2 = FixedPool::<u32>::new(1).unwrap();

        let item = pool1.claim(1).unwrap();

        assert!(matches!(
            pool2.get(&item),
            Err(Error::InvalidHandle(HandleFault::ForeignPool { .. }))
        ));
        assert!(pool1.get(&item).is_ok());
    }

    #[test]
    fn teardown_drops_only_outstanding_items() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = FixedPool::<DropCounter>::new(3).unwrap();

        let a = pool.claim(DropCounter::new(&drops)).unwrap();
        let b = pool.claim(DropCounter::new(&drops)).unwrap();
        let _c = pool.claim(DropCounter::new(&drops)).unwrap();

        pool.reclaim(a).unwrap();
        pool.reclaim(b).unwrap();
        assert_eq!(drops.get(), 2);

        drop(pool);
        assert_eq!(drops.get(), 3);
    }

    #[test]
    fn teardown_drops_outstanding_items_across_words() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = FixedPool::<DropCounter>::new(200).unwrap();

        let mut claimed: Vec<_> = (0..200)
            .map(|_| pool.claim(DropCounter::new(&drops)).unwrap())
            .collect();

        // Keep only items in slots 0, 63, 64 and 199.
        let keep = [0, 63, 64, 199];
        for item in claimed.drain(..) {
            if !keep.contains(&item.index()) {
                pool.reclaim(item).unwrap();
            }
        }

        assert_eq!(drops.get(), 196);
        assert_eq!(pool.used_count(), 4);
        pool.integrity_check();

        drop(pool);
        assert_eq!(drops.get(), 200);
    }

    #[test]
    fn teardown_of_empty_pool_drops_nothing() {
        let drops = Rc::new(Cell::new(0));
        let mut pool = FixedPool::<DropCounter>::new(3).unwrap();

        for _ in 0..3 {
            let item = pool.claim(DropCounter::new(&drops)).unwrap();
            pool.reclaim(item).unwrap();
        }

        assert_eq!(drops.get(), 3);
        drop(pool);
        assert_eq!(drops.get(), 3);
    }

    #[test]
    fn take_leaves_empty_pool_and_keeps_handles_valid() {
        let mut pool_a = FixedPool::<String>::new(3).unwrap();

        let first = pool_a.claim("first".to_string()).unwrap();
        let _second = pool_a.claim("second".to_string()).unwrap();

        let mut pool_b = mem::take(&mut pool_a);

        assert_eq!(pool_a.capacity(), 0);
        assert_eq!(pool_a.free_count(), 0);
        assert_eq!(pool_a.used_count(), 0);

        assert_eq!(pool_b.capacity(), 3);
        assert_eq!(pool_b.free_count(), 1);
        assert_eq!(pool_b.used_count(), 2);

        assert_eq!(pool_b.get(&first).unwrap(), "first");
        assert!(pool_a.get(&first).is_err());

        pool_b.reclaim(first).unwrap();
        assert_eq!(pool_b.used_count(), 1);
    }

    #[test]
    fn assigning_over_pool_tears_down_previous_items() {
        let drops = Rc::new(Cell::new(0));

        let mut pool = FixedPool::<DropCounter>::new(2).unwrap();
        let _a = pool.claim(DropCounter::new(&drops)).unwrap();
        let _b = pool.claim(DropCounter::new(&drops)).unwrap();

        let mut replacement = FixedPool::<DropCounter>::new(1).unwrap();
        let c = replacement.claim(DropCounter::new(&drops)).unwrap();

        pool = replacement;
        assert_eq!(drops.get(), 2);
        assert_eq!(pool.capacity(), 1);

        pool.reclaim(c).unwrap();
        assert_eq!(drops.get(), 3);
    }

    #[test]
    fn drop_with_no_items_does_not_panic_if_policy_must_not_drop() {
        let mut pool = FixedPool::<u64>::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        let item = pool.claim(42).unwrap();
        pool.reclaim(item).unwrap();

        drop(pool);
    }

    #[test]
    #[should_panic]
    fn drop_with_items_panics_if_policy_must_not_drop() {
        let mut pool = FixedPool::<u64>::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        _ = pool.claim(42).unwrap();

        drop(pool);
    }

    #[test]
    fn must_not_drop_policy_still_drops_items_before_panicking() {
        let drops = Rc::new(Cell::new(0));

        let mut pool = FixedPool::<DropCounter>::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        _ = pool.claim(DropCounter::new(&drops)).unwrap();

        let result = catch_unwind(AssertUnwindSafe(move || drop(pool)));

        assert!(result.is_err());
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn contains_checks_slot_addresses() {
        let mut pool = FixedPool::<u64>::new(2).unwrap();
        let item = pool.claim(1).unwrap();

        assert!(pool.contains(item.ptr().as_ptr()));
        assert!(pool.contains(item.ptr().as_ptr().wrapping_add(1)));
        assert!(!pool.contains(item.ptr().as_ptr().wrapping_add(2)));

        let elsewhere = 0_u64;
        assert!(!pool.contains(&raw const elsewhere));
    }

    #[test]
    fn in_refcell_works_fine() {
        let pool = RefCell::new(FixedPool::<u32>::new(3).unwrap());

        let a = pool.borrow_mut().claim(42).unwrap();
        let b = pool.borrow_mut().claim(43).unwrap();

        assert_eq!(*pool.borrow().get(&a).unwrap(), 42);
        assert_eq!(*pool.borrow().get(&b).unwrap(), 43);

        pool.borrow_mut().reclaim(a).unwrap();
        assert_eq!(pool.borrow().used_count(), 1);
    }

    #[test]
    fn multithreaded_via_mutex() {
        let pool = Arc::new(Mutex::new(FixedPool::<u32>::new(3).unwrap()));

        let (a, b, c) = {
            let mut pool = pool.lock().unwrap();
            (
                pool.claim(42).unwrap(),
                pool.claim(43).unwrap(),
                pool.claim(44).unwrap(),
            )
        };

        let pool_clone = Arc::clone(&pool);
        thread::spawn(move || {
            let mut pool = pool_clone.lock().unwrap();

            pool.reclaim(b).unwrap();

            let d = pool.claim(45).unwrap();
            assert_eq!(*pool.get(&d).unwrap(), 45);
            pool.reclaim(d).unwrap();
        })
        .join()
        .unwrap();

        let pool = pool.lock().unwrap();
        assert_eq!(*pool.get(&a).unwrap(), 42);
        assert_eq!(*pool.get(&c).unwrap(), 44);
        assert_eq!(pool.used_count(), 2);
    }

    #[test]
    fn debug_output_describes_pool() {
        let pool = FixedPool::<u16>::new(4).unwrap();

        let text = format!("{pool:?}");
        assert!(text.contains("u16"));
        assert!(text.contains("capacity: 4"));
    }

    #[test]
    #[should_panic]
    fn zst_is_panic() {
        drop(FixedPool::<()>::new(3));
    }
}
