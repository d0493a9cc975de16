//! Shared contract and bucket-indexing helpers for the four set variants.

pub mod coarse;
pub mod refinable;
pub mod sequential;
pub mod striped;

use std::hash::{BuildHasher, Hash, Hasher};

/// Minimum number of buckets a table may shrink to (kMinBuckets).
pub const MIN_BUCKETS: usize = 4;

/// Growth threshold: resize to double the bucket count once
/// `size / buckets` exceeds this.
pub const MAX_LOAD_FACTOR: f64 = 4.0;

/// Shrink threshold: resize to half the bucket count once
/// `size / buckets` drops below this (never below [`MIN_BUCKETS`]).
pub const MIN_LOAD_FACTOR: f64 = 1.0;

/// Rounds a requested capacity up to [`MIN_BUCKETS`]; `0` maps to
/// `MIN_BUCKETS`.
pub fn normalize_capacity(requested: usize) -> usize {
    requested.max(MIN_BUCKETS)
}

/// Computes `hash(elem) mod cap` using the given hasher builder.
pub fn bucket_index<T, S>(hash_builder: &S, elem: &T, cap: usize) -> usize
where
    T: Hash,
    S: BuildHasher,
{
    let mut hasher = hash_builder.build_hasher();
    elem.hash(&mut hasher);
    (hasher.finish() as usize) % cap
}

/// Defines common behavior for a set. Every variant in this crate
/// implements this trait identically from the outside; they differ
/// only in the synchronization strategy behind it.
pub trait Set {
    /// Type of element contained in the set.
    type Elem;

    /// Attempts to add an element to the set.
    ///
    /// Returns `true` if the element is newly inserted, or `false` if
    /// it was already present (the set is left unmodified).
    fn add(&self, elem: Self::Elem) -> bool;

    /// Attempts to remove an element from the set.
    ///
    /// Returns `true` if the element was present and has been
    /// removed, or `false` if it was absent (the set is left
    /// unmodified).
    fn remove(&self, elem: &Self::Elem) -> bool;

    /// Reports whether `elem` is a member of the set at some moment
    /// during the call.
    fn contains(&self, elem: &Self::Elem) -> bool;

    /// Returns the number of elements in the set at some moment
    /// during the call.
    fn len(&self) -> usize;

    /// Reports whether the set held no elements at some moment during
    /// the call.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rounds_up_to_floor() {
        assert_eq!(normalize_capacity(0), MIN_BUCKETS);
        assert_eq!(normalize_capacity(1), MIN_BUCKETS);
        assert_eq!(normalize_capacity(4), 4);
        assert_eq!(normalize_capacity(100), 100);
    }
}
