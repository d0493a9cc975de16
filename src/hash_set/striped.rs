//! The striped set: a fixed-size array of stripe locks, independent of
//! the bucket count. `stripe(b) = b mod S`; resize grows only the
//! bucket array, never the stripe count.

use std::cell::UnsafeCell;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crossbeam_utils::CachePadded;

use super::{bucket_index, normalize_capacity, Set, MAX_LOAD_FACTOR, MIN_BUCKETS, MIN_LOAD_FACTOR};

const DEFAULT_STRIPES: usize = 64;

/// The live bucket array. Unlike [`refinable`](super::refinable), bucket
/// chains here carry no lock of their own — multiple buckets share one
/// stripe mutex, so each chain is a bare [`UnsafeCell`] whose access is
/// synchronized entirely by the stripe lock covering it.
struct Buckets<T> {
    slots: Box<[UnsafeCell<Vec<T>>]>,
}

// SAFETY: access to each `UnsafeCell<Vec<T>>` is only ever performed
// while holding the stripe mutex that owns its index (see
// `StripedSet::lock_bucket_for`), so concurrent access is serialized
// exactly as a `Mutex<Vec<T>>` would provide.
unsafe impl<T: Send> Sync for Buckets<T> {}

impl<T> Buckets<T> {
    fn with_capacity(cap: usize) -> Self {
        Self {
            slots: (0..cap).map(|_| UnsafeCell::new(Vec::new())).collect(),
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// A hash set whose lock array is a fixed-size sequence of stripe
/// mutexes, chosen once at construction and never resized.
pub struct StripedSet<T, S = RandomState> {
    buckets: CachePadded<AtomicPtr<Buckets<T>>>,
    stripes: Box<[Mutex<()>]>,
    resize_mutex: Mutex<()>,
    size: CachePadded<AtomicUsize>,
    num_stripes: usize,
    hash_builder: S,
}

impl<T> StripedSet<T, RandomState>
where
    T: Hash + Eq,
{
    /// Creates a set with room for at least `initial_capacity` buckets
    /// and `stripes` stripe locks (`0` is silently coerced to 64).
    pub fn new(initial_capacity: usize, stripes: usize) -> Self {
        Self::with_hasher(initial_capacity, stripes, RandomState::default())
    }
}

impl<T, S> StripedSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a set using a caller-supplied hasher builder.
    pub fn with_hasher(initial_capacity: usize, stripes: usize, hash_builder: S) -> Self {
        let num_stripes = if stripes == 0 { DEFAULT_STRIPES } else { stripes };
        let cap = normalize_capacity(initial_capacity);
        let buckets = Box::new(Buckets::with_capacity(cap));
        Self {
            buckets: CachePadded::new(AtomicPtr::new(Box::into_raw(buckets))),
            stripes: (0..num_stripes).map(|_| Mutex::new(())).collect(),
            resize_mutex: Mutex::new(()),
            size: CachePadded::new(AtomicUsize::new(0)),
            num_stripes,
            hash_builder,
        }
    }

    /// Number of stripe locks — fixed for the lifetime of the set.
    /// Test hook for scenario S6.
    pub fn stripe_count(&self) -> usize {
        self.num_stripes
    }

    /// Current number of buckets. Test hook for scenarios S2/S6.
    pub fn bucket_count(&self) -> usize {
        unsafe { &*self.buckets.load(Ordering::Acquire) }.len()
    }

    /// Acquires the correct stripe lock for `elem`, retrying if a
    /// resize interposes between observing the bucket count and
    /// taking the lock (steps 1-3 of the per-operation protocol).
    ///
    /// Holding any one stripe lock blocks `resize` (which must acquire
    /// every stripe lock, in order, before touching the bucket array),
    /// so the `Buckets` reference handed back here is guaranteed valid
    /// for as long as the returned guard is held.
    fn lock_bucket_for<'a>(&'a self, elem: &T) -> (MutexGuard<'a, ()>, &'a Buckets<T>, usize) {
        loop {
            let cap_before = unsafe { &*self.buckets.load(Ordering::Acquire) }.len();
            let idx = bucket_index(&self.hash_builder, elem, cap_before);
            let stripe = idx % self.num_stripes;
            let guard = self.stripes[stripe].lock().unwrap();

            let buckets = unsafe { &*self.buckets.load(Ordering::Acquire) };
            if buckets.len() != cap_before {
                drop(guard);
                continue;
            }
            return (guard, buckets, idx);
        }
    }

    fn resize(&self, new_cap: usize) {
        let _resize_guard = self.resize_mutex.lock().unwrap();
        let new_cap = normalize_capacity(new_cap);
        let current = unsafe { &*self.buckets.load(Ordering::Acquire) }.len();
        if new_cap == current {
            return;
        }
        log::debug!("StripedSet resize: {} -> {} buckets", current, new_cap);

        // Fixed acquisition order across all stripes prevents deadlock;
        // normal operations only ever take one.
        let _stripe_guards: Vec<_> = self.stripes.iter().map(|m| m.lock().unwrap()).collect();

        let old_ptr = self.buckets.load(Ordering::Acquire);
        let old_buckets = unsafe { Box::from_raw(old_ptr) };
        let new_buckets = Buckets::with_capacity(new_cap);

        for old_slot in old_buckets.slots.iter() {
            let chain = unsafe { &mut *old_slot.get() };
            for elem in chain.drain(..) {
                let idx = bucket_index(&self.hash_builder, &elem, new_cap);
                unsafe { &mut *new_buckets.slots[idx].get() }.push(elem);
            }
        }

        let new_ptr = Box::into_raw(Box::new(new_buckets));
        self.buckets.store(new_ptr, Ordering::Release);
        // `old_buckets` drops here: safe because every stripe lock is
        // still held, so no op can be mid-access to the old array.
        log::trace!("StripedSet resize complete");
    }
}

impl<T, S> Set for StripedSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Elem = T;

    fn add(&self, elem: T) -> bool {
        let (guard, buckets, idx) = self.lock_bucket_for(&elem);
        let cap = buckets.len();
        let bucket = unsafe { &mut *buckets.slots[idx].get() };
        if bucket.iter().any(|v| *v == elem) {
            return false;
        }
        bucket.push(elem);
        self.size.fetch_add(1, Ordering::Relaxed);
        drop(guard);

        let size = self.size.load(Ordering::Relaxed);
        if size as f64 / cap as f64 > MAX_LOAD_FACTOR {
            self.resize(cap * 2);
        }
        true
    }

    fn remove(&self, elem: &T) -> bool {
        let (guard, buckets, idx) = self.lock_bucket_for(elem);
        let cap = buckets.len();
        let bucket = unsafe { &mut *buckets.slots[idx].get() };
        let removed = match bucket.iter().position(|v| v == elem) {
            Some(pos) => {
                bucket.remove(pos);
                self.size.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        };
        drop(guard);

        if removed && cap > MIN_BUCKETS {
            let size = self.size.load(Ordering::Relaxed);
            if (size as f64 / cap as f64) < MIN_LOAD_FACTOR {
                self.resize(cap / 2);
            }
        }
        removed
    }

    fn contains(&self, elem: &T) -> bool {
        let (_guard, buckets, idx) = self.lock_bucket_for(elem);
        let bucket = unsafe { &*buckets.slots[idx].get() };
        bucket.iter().any(|v| v == elem)
    }

    fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }
}

impl<T, S> Drop for StripedSet<T, S> {
    fn drop(&mut self) {
        let ptr = self.buckets.load(Ordering::Acquire);
        // SAFETY: `self` uniquely owns this allocation; no other
        // reference to it can outlive `&mut self`.
        unsafe {
            drop(Box::from_raw(ptr));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn scenario_s1_basic_add_contains() {
        let set = StripedSet::new(4, 64);
        assert!(set.add(1));
        assert!(set.add(2));
        assert!(set.add(3));
        assert_eq!(set.len(), 3);
        assert!(set.contains(&2));
        assert!(!set.contains(&4));
    }

    #[test]
    fn scenario_s2_grow_then_shrink() {
        let set = StripedSet::new(4, 64);
        for i in 1..=100 {
            set.add(i);
        }
        for i in 1..=50 {
            set.remove(&i);
        }
        assert_eq!(set.len(), 50);
        assert!(!set.contains(&25));
        assert!(set.contains(&75));
        assert!(set.bucket_count() > 4);
    }

    #[test]
    fn scenario_s3_duplicate_add() {
        let set = StripedSet::new(4, 64);
        assert!(set.add(7));
        for _ in 0..9 {
            assert!(!set.add(7));
        }
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn zero_stripes_coerced_to_default() {
        let set = StripedSet::<i32>::new(4, 0);
        assert_eq!(set.stripe_count(), DEFAULT_STRIPES);
    }

    #[test]
    fn scenario_s6_stripe_count_invariant_under_growth() {
        let set = StripedSet::new(4, 8);
        for i in 0..5000 {
            set.add(i);
        }
        assert!(set.bucket_count() >= 256);
        assert_eq!(set.stripe_count(), 8);
    }

    #[test]
    fn concurrent_disjoint_inserts_all_land() {
        let set = Arc::new(StripedSet::new(4, 16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let set = set.clone();
                thread::spawn(move || {
                    for i in 0..2000 {
                        set.add(t * 2000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(set.len(), 16_000);
        for v in 0..16_000 {
            assert!(set.contains(&v));
        }
    }
}
