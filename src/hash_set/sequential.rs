//! The single-threaded reference set: no synchronization, used as the
//! semantic oracle against which the concurrent variants are checked.

use std::cell::RefCell;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};

use super::{bucket_index, normalize_capacity, Set, MAX_LOAD_FACTOR};

struct Inner<T> {
    buckets: Vec<Vec<T>>,
    size: usize,
}

impl<T> Inner<T> {
    fn with_capacity(cap: usize) -> Self {
        Self {
            buckets: (0..cap).map(|_| Vec::new()).collect(),
            size: 0,
        }
    }
}

/// A hash set with no internal synchronization.
///
/// Exposes the same `&self`-based [`Set`] contract as the concurrent
/// variants via an internal [`RefCell`], so it can be driven from test
/// code without `&mut` plumbing. It is not `Sync`: sharing one across
/// threads is a compile error, matching its single-threaded contract.
pub struct SequentialSet<T, S = RandomState> {
    inner: RefCell<Inner<T>>,
    hash_builder: S,
}

impl<T> SequentialSet<T, RandomState>
where
    T: Hash + Eq,
{
    /// Creates a set with room for at least `initial_capacity` buckets
    /// (rounded up to the minimum).
    pub fn new(initial_capacity: usize) -> Self {
        Self::with_hasher(initial_capacity, RandomState::default())
    }
}

impl<T, S> SequentialSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a set using a caller-supplied hasher builder.
    pub fn with_hasher(initial_capacity: usize, hash_builder: S) -> Self {
        Self {
            inner: RefCell::new(Inner::with_capacity(normalize_capacity(initial_capacity))),
            hash_builder,
        }
    }

    fn resize(&self, inner: &mut Inner<T>, new_cap: usize) {
        let new_cap = normalize_capacity(new_cap);
        if new_cap == inner.buckets.len() {
            return;
        }
        let old_buckets = std::mem::replace(
            &mut inner.buckets,
            (0..new_cap).map(|_| Vec::new()).collect(),
        );
        for bucket in old_buckets {
            for elem in bucket {
                let idx = bucket_index(&self.hash_builder, &elem, new_cap);
                inner.buckets[idx].push(elem);
            }
        }
    }
}

impl<T, S> Set for SequentialSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Elem = T;

    fn add(&self, elem: T) -> bool {
        let mut inner = self.inner.borrow_mut();
        let cap = inner.buckets.len();
        let idx = bucket_index(&self.hash_builder, &elem, cap);
        if inner.buckets[idx].iter().any(|v| *v == elem) {
            return false;
        }
        inner.buckets[idx].push(elem);
        inner.size += 1;

        if inner.size as f64 / cap as f64 > MAX_LOAD_FACTOR {
            self.resize(&mut inner, cap * 2);
        }
        true
    }

    // Intentionally non-shrinking: this variant exists only as the
    // comparison baseline, not as a production path.
    fn remove(&self, elem: &T) -> bool {
        let mut inner = self.inner.borrow_mut();
        let cap = inner.buckets.len();
        let idx = bucket_index(&self.hash_builder, elem, cap);
        let bucket = &mut inner.buckets[idx];
        match bucket.iter().position(|v| v == elem) {
            Some(pos) => {
                bucket.remove(pos);
                inner.size -= 1;
                true
            }
            None => false,
        }
    }

    fn contains(&self, elem: &T) -> bool {
        let inner = self.inner.borrow();
        let cap = inner.buckets.len();
        let idx = bucket_index(&self.hash_builder, elem, cap);
        inner.buckets[idx].iter().any(|v| v == elem)
    }

    fn len(&self) -> usize {
        self.inner.borrow().size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s1_basic_add_contains() {
        let set = SequentialSet::new(4);
        assert!(set.add(1));
        assert!(set.add(2));
        assert!(set.add(3));
        assert_eq!(set.len(), 3);
        assert!(set.contains(&2));
        assert!(!set.contains(&4));
    }

    #[test]
    fn scenario_s2_grow_then_remove_half() {
        let set = SequentialSet::new(4);
        for i in 1..=100 {
            set.add(i);
        }
        for i in 1..=50 {
            set.remove(&i);
        }
        assert_eq!(set.len(), 50);
        assert!(!set.contains(&25));
        assert!(set.contains(&75));
    }

    #[test]
    fn scenario_s3_duplicate_add() {
        let set = SequentialSet::new(4);
        assert!(set.add(7));
        for _ in 0..9 {
            assert!(!set.add(7));
        }
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let set = SequentialSet::<i32>::new(4);
        assert!(!set.remove(&42));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn resize_preserves_every_element() {
        let set = SequentialSet::new(4);
        for i in 0..500 {
            set.add(i);
        }
        assert_eq!(set.len(), 500);
        for i in 0..500 {
            assert!(set.contains(&i));
        }
    }
}
