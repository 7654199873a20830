use std::alloc::{Layout, alloc, dealloc};
use std::any::type_name;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::slice;

use crate::{Error, Result};

/// A fixed-capacity heap-allocated block of uninitialized storage for items of type `T`.
///
/// This is the backing storage of a [`FixedPool`][crate::FixedPool] but is also usable on its
/// own when the caller wants to track object lifetimes itself.
///
/// The storage knows nothing about which slots hold live objects. It never runs `T`
/// destructors, including when it is dropped - that responsibility belongs to the owner.
///
/// The address range `[base, base + capacity)` never changes for the lifetime of the storage,
/// including when the storage value itself is moved. Taking the storage out of a place via
/// [`std::mem::take`] leaves an empty storage of capacity zero behind.
///
/// # Examples
///
/// ```
/// use fixed_pool::RawStorage;
///
/// let mut storage = RawStorage::<u64>::new(4).unwrap();
/// assert_eq!(storage.capacity(), 4);
///
/// let slot = storage.slot_ptr(2).unwrap();
///
/// // SAFETY: The slot is valid for writes and nothing else references it.
/// unsafe { slot.as_ptr().write(std::mem::MaybeUninit::new(42)) };
///
/// assert_eq!(storage.index_of(slot.as_ptr().cast()), Some(2));
/// assert!(storage.slot_ptr(4).is_err());
/// ```
pub struct RawStorage<T> {
    /// Points to the first of `capacity` slots. Dangling (but well-aligned) when the
    /// capacity is zero, in which case nothing was allocated.
    base: NonNull<MaybeUninit<T>>,

    capacity: usize,
}

impl<T> RawStorage<T> {
    /// Allocates uninitialized storage for `capacity` items of type `T`.
    ///
    /// A capacity of zero is valid and performs no allocation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the total size overflows the address space or if the
    /// allocator cannot satisfy the request.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized. Slots are identified by their address, so every slot of a
    /// zero-sized type would be indistinguishable from the others.
    pub fn new(capacity: usize) -> Result<Self> {
        assert!(
            size_of::<T>() > 0,
            "RawStorage must have non-zero item size"
        );

        if capacity == 0 {
            return Ok(Self::empty());
        }

        let Ok(layout) = Layout::array::<T>(capacity) else {
            return Err(Self::allocation_error(capacity));
        };

        // SAFETY: The layout is valid (checked above) and not zero-sized because both the
        // capacity and the item size are non-zero.
        let ptr = unsafe { alloc(layout) };

        let Some(base) = NonNull::new(ptr.cast::<MaybeUninit<T>>()) else {
            return Err(Self::allocation_error(capacity));
        };

        Ok(Self { base, capacity })
    }

    /// Creates a storage with zero capacity. Performs no allocation.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            base: NonNull::dangling(),
            capacity: 0,
        }
    }

    fn allocation_error(capacity: usize) -> Error {
        Error::Allocation {
            item_type: type_name::<T>(),
            capacity,
        }
    }

    fn layout(&self) -> Layout {
        Layout::array::<T>(self.capacity)
            .expect("layout was already validated when the storage was allocated")
    }

    /// The number of slots in the storage.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a pointer to the slot at `index`.
    ///
    /// The slot may or may not contain an initialized `T`; the storage does not track this.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `index` is not less than the capacity.
    #[inline]
    pub fn slot_ptr(&self, index: usize) -> Result<NonNull<MaybeUninit<T>>> {
        if index >= self.capacity {
            return Err(Error::OutOfRange {
                index,
                capacity: self.capacity,
            });
        }

        // SAFETY: Guarded by the bounds check above, so the result is within the allocation.
        Ok(unsafe { self.base.add(index) })
    }

    /// Maps an address back to the index of the slot it points to.
    ///
    /// Returns `None` if the address is before the first slot, at or after the end of the
    /// storage, or not at the start of a slot. This is plain offset arithmetic and does not
    /// dereference the pointer.
    #[must_use]
    pub fn index_of(&self, ptr: *const T) -> Option<usize> {
        let item_size = size_of::<T>();

        let offset = ptr.addr().checked_sub(self.base.as_ptr().addr())?;
        let index = offset.checked_div(item_size)?;

        if index.checked_mul(item_size)? != offset {
            return None;
        }

        (index < self.capacity).then_some(index)
    }

    /// Whether the address points to the start of one of this storage's slots.
    #[must_use]
    pub fn contains(&self, ptr: *const T) -> bool {
        self.index_of(ptr).is_some()
    }

    /// A view of every slot in the storage, in slot order.
    #[must_use]
    pub fn as_uninit_slice(&self) -> &[MaybeUninit<T>] {
        // SAFETY: The base points to `capacity` contiguous slots (or is dangling and well-aligned
        // for a zero-length slice). `MaybeUninit<T>` has no validity requirements.
        unsafe { slice::from_raw_parts(self.base.as_ptr(), self.capacity) }
    }

    /// An exclusive view of every slot in the storage, in slot order.
    #[must_use]
    pub fn as_uninit_slice_mut(&mut self) -> &mut [MaybeUninit<T>] {
        // SAFETY: As in `as_uninit_slice()`, and we hold an exclusive reference to the storage.
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.capacity) }
    }
}

impl<T> Default for RawStorage<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Drop for RawStorage<T> {
    fn drop(&mut self) {
        if self.capacity == 0 {
            return;
        }

        // SAFETY: The memory was allocated in `new()` with the same layout and has not been
        // released yet. No `T` destructors are run - that is the owner's job.
        unsafe {
            dealloc(self.base.as_ptr().cast(), self.layout());
        }
    }
}

impl<T> fmt::Debug for RawStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawStorage")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .finish()
    }
}

// SAFETY: The storage exclusively owns its allocation and holds no thread-bound state, so it can
// move between threads whenever the items it is meant to hold can.
unsafe impl<T: Send> Send for RawStorage<T> {}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::cast_ptr_alignment,
    reason = "test code does not need the same safety rigor as production code"
)]
mod tests {
    use std::mem;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(RawStorage<u32>: Send, fmt::Debug, Default);
    assert_not_impl_any!(RawStorage<u32>: Sync, Clone);

    #[test]
    fn smoke_test() {
        let storage = RawStorage::<u32>::new(3).unwrap();

        assert_eq!(storage.capacity(), 3);
        assert_eq!(storage.as_uninit_slice().len(), 3);

        for index in 0..3 {
            let slot = storage.slot_ptr(index).unwrap();
            unsafe { slot.as_ptr().write(MaybeUninit::new(index as u32 * 10)) };
        }

        for index in 0..3 {
            let slot = storage.slot_ptr(index).unwrap();
            assert_eq!(unsafe { slot.as_ref().assume_init() }, index as u32 * 10);
        }
    }

    #[test]
    fn zero_capacity_is_empty() {
        let storage = RawStorage::<u64>::new(0).unwrap();

        assert_eq!(storage.capacity(), 0);
        assert!(storage.as_uninit_slice().is_empty());
        assert!(matches!(
            storage.slot_ptr(0),
            Err(Error::OutOfRange {
                index: 0,
                capacity: 0
            })
        ));
    }

    #[test]
    fn slot_ptr_out_of_range_is_error() {
        let storage = RawStorage::<u64>::new(4).unwrap();

        assert!(storage.slot_ptr(3).is_ok());
        assert!(matches!(
            storage.slot_ptr(4),
            Err(Error::OutOfRange {
                index: 4,
                capacity: 4
            })
        ));
        assert!(storage.slot_ptr(usize::MAX).is_err());
    }

    #[test]
    fn slots_are_contiguous() {
        let storage = RawStorage::<u64>::new(4).unwrap();

        let first = storage.slot_ptr(0).unwrap().as_ptr().addr();
        let last = storage.slot_ptr(3).unwrap().as_ptr().addr();

        assert_eq!(last - first, 3 * size_of::<u64>());
    }

    #[test]
    fn index_of_maps_slot_addresses() {
        let storage = RawStorage::<u64>::new(4).unwrap();

        for index in 0..4 {
            let slot = storage.slot_ptr(index).unwrap().as_ptr().cast::<u64>();
            assert_eq!(storage.index_of(slot), Some(index));
            assert!(storage.contains(slot));
        }
    }

    #[test]
    fn index_of_rejects_one_past_end() {
        let storage = RawStorage::<u64>::new(4).unwrap();

        let end = storage
            .slot_ptr(3)
            .unwrap()
            .as_ptr()
            .cast::<u64>()
            .wrapping_add(1);

        assert_eq!(storage.index_of(end), None);
    }

    #[test]
    fn index_of_rejects_before_base() {
        let storage = RawStorage::<u64>::new(4).unwrap();

        let before = storage
            .slot_ptr(0)
            .unwrap()
            .as_ptr()
            .cast::<u64>()
            .wrapping_sub(1);

        assert_eq!(storage.index_of(before), None);
    }

    #[test]
    fn index_of_rejects_mid_slot_address() {
        let storage = RawStorage::<u64>::new(4).unwrap();

        let mid_slot = storage
            .slot_ptr(1)
            .unwrap()
            .as_ptr()
            .cast::<u8>()
            .wrapping_add(1)
            .cast::<u64>();

        assert_eq!(storage.index_of(mid_slot), None);
    }

    #[test]
    fn index_of_rejects_foreign_address() {
        let storage = RawStorage::<u64>::new(4).unwrap();
        let other = RawStorage::<u64>::new(4).unwrap();

        let foreign = other.slot_ptr(0).unwrap().as_ptr().cast::<u64>();
        assert!(!storage.contains(foreign));

        let on_stack = 5_u64;
        assert!(!storage.contains(&raw const on_stack));
    }

    #[test]
    fn empty_storage_contains_nothing() {
        let storage = RawStorage::<u64>::empty();

        assert!(!storage.contains(NonNull::<u64>::dangling().as_ptr()));
    }

    #[test]
    fn take_leaves_empty_storage() {
        let mut storage = RawStorage::<u32>::new(8).unwrap();
        let base = storage.slot_ptr(0).unwrap();

        let taken = mem::take(&mut storage);

        assert_eq!(storage.capacity(), 0);
        assert_eq!(taken.capacity(), 8);
        assert_eq!(taken.slot_ptr(0).unwrap(), base);
    }

    #[test]
    fn bulk_view_covers_all_slots() {
        let mut storage = RawStorage::<u16>::new(5).unwrap();

        for (index, slot) in storage.as_uninit_slice_mut().iter_mut().enumerate() {
            slot.write(index as u16);
        }

        let values: Vec<u16> = storage
            .as_uninit_slice()
            .iter()
            .map(|slot| unsafe { slot.assume_init() })
            .collect();

        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overflowing_capacity_is_allocation_error() {
        let result = RawStorage::<u64>::new(usize::MAX);

        assert!(matches!(
            result,
            Err(Error::Allocation {
                capacity: usize::MAX,
                ..
            })
        ));
    }

    #[test]
    #[should_panic]
    fn zst_is_panic() {
        drop(RawStorage::<()>::new(3));
    }
}
