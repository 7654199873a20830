use std::marker::PhantomData;

use crate::{DropPolicy, FixedPool, Result};

/// Builder for creating an instance of [`FixedPool`].
///
/// The capacity is mandatory, the other settings are optional. If the defaults suit you,
/// [`FixedPool::new()`][1] is a shorthand for setting only the capacity.
///
/// # Examples
///
/// ```
/// use fixed_pool::{DropPolicy, FixedPool};
///
/// let pool = FixedPool::<u32>::builder()
///     .capacity(16)
///     .drop_policy(DropPolicy::MayDropItems)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.capacity(), 16);
/// ```
///
/// [1]: FixedPool::new
#[must_use]
pub struct FixedPoolBuilder<T> {
    capacity: Option<usize>,
    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T> std::fmt::Debug for FixedPoolBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedPoolBuilder")
            .field(
                "item_type",
                &std::format_args!("{}", std::any::type_name::<T>()),
            )
            .field("capacity", &self.capacity)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T> FixedPoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            capacity: None,
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the number of items the pool can hold. The capacity never changes afterwards.
    ///
    /// Zero is a valid capacity, yielding a pool on which every claim fails.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat claimed items that remain in the pool when the pool is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::{DropPolicy, FixedPool};
    ///
    /// let pool = FixedPool::<u32>::builder()
    ///     .capacity(4)
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration, allocating all of its storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`][crate::Error::Allocation] if the storage cannot be
    /// allocated.
    ///
    /// # Panics
    ///
    /// Panics if no capacity has been set or if `T` is zero-sized.
    pub fn build(self) -> Result<FixedPool<T>> {
        let capacity = self
            .capacity
            .expect("capacity must be set using .capacity() before calling .build()");

        FixedPool::new_inner(capacity, self.drop_policy)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(FixedPoolBuilder<u32>: Send, Sync, std::fmt::Debug);
    assert_impl_all!(FixedPoolBuilder<Cell<u32>>: Send);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = FixedPoolBuilder::<u32>::new();

        assert!(builder.capacity.is_none());
        assert_eq!(builder.drop_policy, DropPolicy::default());
    }

    #[test]
    fn capacity_sets_capacity() {
        let builder = FixedPoolBuilder::<u32>::new().capacity(12);

        assert_eq!(builder.capacity, Some(12));
    }

    #[test]
    fn drop_policy_sets_policy() {
        let builder = FixedPoolBuilder::<u32>::new().drop_policy(DropPolicy::MustNotDropItems);
        assert_eq!(builder.drop_policy, DropPolicy::MustNotDropItems);

        let builder = FixedPoolBuilder::<u32>::new().drop_policy(DropPolicy::MayDropItems);
        assert_eq!(builder.drop_policy, DropPolicy::MayDropItems);
    }

    #[test]
    fn build_applies_configuration() {
        let pool = FixedPoolBuilder::<u64>::new()
            .capacity(5)
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.free_count(), 5);
        assert_eq!(pool.drop_policy(), DropPolicy::MustNotDropItems);
    }

    #[test]
    #[should_panic]
    fn build_without_capacity_panics() {
        drop(FixedPoolBuilder::<u64>::new().build());
    }

    #[test]
    #[should_panic]
    fn build_zero_sized_type_panics() {
        drop(FixedPoolBuilder::<()>::new().capacity(3).build());
    }

    #[test]
    fn build_overflowing_capacity_is_error() {
        let result = FixedPoolBuilder::<u64>::new().capacity(usize::MAX).build();

        assert!(matches!(
            result,
            Err(crate::Error::Allocation {
                capacity: usize::MAX,
                ..
            })
        ));
    }
}
