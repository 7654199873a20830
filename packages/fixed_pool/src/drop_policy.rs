/// Determines what a pool does with items that are still claimed when the pool is dropped.
///
/// By default, the pool drops any remaining items as part of its teardown.
///
/// # Examples
///
/// ```
/// use fixed_pool::{DropPolicy, FixedPool};
///
/// // The drop policy is set at pool creation time.
/// let pool = FixedPool::<u32>::builder()
///     .capacity(8)
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.drop_policy(), DropPolicy::MustNotDropItems);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Outstanding items are dropped when the pool is dropped. This is the default.
    #[default]
    MayDropItems,

    /// The pool panics if it still holds claimed items when it is dropped.
    ///
    /// Useful when every claim is expected to be matched by a reclaim, for example because
    /// unsafe code holds out of band pointers to the items and must release them first.
    /// The items are still dropped before the panic is raised.
    MustNotDropItems,
}
