//! The coarse-grained set: one mutex for the whole table, held across
//! resizes.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Mutex;

use super::{bucket_index, normalize_capacity, Set, MAX_LOAD_FACTOR, MIN_BUCKETS, MIN_LOAD_FACTOR};

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

/// A hash set guarded by a single global mutex.
///
/// All four operations take the mutex for their full duration. A
/// resize triggered by `add`/`remove` runs while the same mutex is
/// still held — it is never released and re-acquired mid-operation.
pub struct CoarseSet<T, S = RandomState> {
    inner: Mutex<Inner<T>>,
    hash_builder: S,
}

impl<T> CoarseSet<T, RandomState>
where
    T: Hash + Eq,
{
    /// Creates a set with room for at least `initial_capacity` buckets
    /// (rounded up to the minimum).
    pub fn new(initial_capacity: usize) -> Self {
        Self::with_hasher(initial_capacity, RandomState::default())
    }
}

impl<T, S> CoarseSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a set using a caller-supplied hasher builder.
    pub fn with_hasher(initial_capacity: usize, hash_builder: S) -> Self {
        Self {
            inner: Mutex::new(Inner::with_capacity(normalize_capacity(initial_capacity))),
            hash_builder,
        }
    }

    fn resize_locked(&self, inner: &mut Inner<T>, new_cap: usize) {
        let new_cap = normalize_capacity(new_cap);
        if new_cap == inner.buckets.len() {
            return;
        }
        log::debug!(
            "CoarseSet resize: {} -> {} buckets ({} elements)",
            inner.buckets.len(),
            new_cap,
            inner.size
        );
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

impl<T, S> Set for CoarseSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Elem = T;

    fn add(&self, elem: T) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let cap = inner.buckets.len();
        let idx = bucket_index(&self.hash_builder, &elem, cap);
        if inner.buckets[idx].iter().any(|v| *v == elem) {
            return false;
        }
        inner.buckets[idx].push(elem);
        inner.size += 1;

        if inner.size as f64 / cap as f64 > MAX_LOAD_FACTOR {
            self.resize_locked(&mut inner, cap * 2);
        }
        true
    }

    fn remove(&self, elem: &T) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let cap = inner.buckets.len();
        let idx = bucket_index(&self.hash_builder, elem, cap);
        let bucket = &mut inner.buckets[idx];
        let removed = match bucket.iter().position(|v| v == elem) {
            Some(pos) => {
                bucket.remove(pos);
                inner.size -= 1;
                true
            }
            None => false,
        };

        if removed && cap > MIN_BUCKETS && (inner.size as f64 / cap as f64) < MIN_LOAD_FACTOR {
            self.resize_locked(&mut inner, cap / 2);
        }
        removed
    }

    fn contains(&self, elem: &T) -> bool {
        let inner = self.inner.lock().unwrap();
        let cap = inner.buckets.len();
        let idx = bucket_index(&self.hash_builder, elem, cap);
        inner.buckets[idx].iter().any(|v| v == elem)
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap().size
    }
}
