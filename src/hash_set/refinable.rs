//! The refinable set: one mutex per bucket, growing and shrinking with
//! the bucket array itself. Because the lock array changes shape on
//! resize, normal operations confirm — via a version stamp — that the
//! lock they acquired still belongs to the current geometry.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crossbeam_utils::CachePadded;

use super::{bucket_index, normalize_capacity, Set, MAX_LOAD_FACTOR, MIN_BUCKETS, MIN_LOAD_FACTOR};

/// Number of spin iterations before the pre-operation wait gate yields
/// the scheduler. Not part of the observable contract; only needed for
/// progress under oversubscription.
const SPIN_LIMIT: u32 = 32;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Lazily assigned on first touch; 0 is reserved for "no owner".
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// The live bucket array. Each bucket chain carries its own mutex, so
/// `len(locks) == len(buckets)` holds by construction — there is no
/// separate lock array to keep in sync.
struct Buckets<T> {
    slots: Box<[Mutex<Vec<T>>]>,
}

impl<T> Buckets<T> {
    fn with_capacity(cap: usize) -> Self {
        Self {
            slots: (0..cap).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// A hash set with one lock per bucket; both the bucket array and the
/// lock array grow and shrink together on resize.
pub struct RefinableSet<T, S = RandomState> {
    buckets: CachePadded<AtomicPtr<Buckets<T>>>,
    /// Retired bucket/lock arrays, kept alive so a thread blocked on an
    /// old bucket mutex at the moment of a swap never observes a
    /// destroyed mutex. Freed only when the set itself is dropped.
    retired: Mutex<Vec<Box<Buckets<T>>>>,
    resize_mutex: Mutex<()>,
    version: CachePadded<AtomicU64>,
    resizing: CachePadded<AtomicBool>,
    owner: CachePadded<AtomicU64>,
    size: CachePadded<AtomicUsize>,
    hash_builder: S,
}

impl<T> RefinableSet<T, RandomState>
where
    T: Hash + Eq,
{
    /// Creates a set with room for at least `initial_capacity` buckets
    /// (rounded up to the minimum).
    pub fn new(initial_capacity: usize) -> Self {
        Self::with_hasher(initial_capacity, RandomState::default())
    }
}

impl<T, S> RefinableSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a set using a caller-supplied hasher builder.
    pub fn with_hasher(initial_capacity: usize, hash_builder: S) -> Self {
        let cap = normalize_capacity(initial_capacity);
        Self {
            buckets: CachePadded::new(AtomicPtr::new(Box::into_raw(Box::new(
                Buckets::with_capacity(cap),
            )))),
            retired: Mutex::new(Vec::new()),
            resize_mutex: Mutex::new(()),
            version: CachePadded::new(AtomicU64::new(0)),
            resizing: CachePadded::new(AtomicBool::new(false)),
            owner: CachePadded::new(AtomicU64::new(0)),
            size: CachePadded::new(AtomicUsize::new(0)),
            hash_builder,
        }
    }

    /// Current number of buckets, equal to the current number of
    /// bucket locks (I5). Test hook for scenarios S2/S5.
    pub fn bucket_count(&self) -> usize {
        unsafe { &*self.buckets.load(Ordering::Acquire) }.len()
    }

    /// Current number of bucket locks. Always equal to
    /// [`bucket_count`](Self::bucket_count); exposed separately so
    /// tests can assert I5 without relying on that equality itself.
    pub fn lock_count(&self) -> usize {
        self.bucket_count()
    }

    fn wait_for_resize(&self) {
        let self_id = current_thread_id();
        let mut spins = 0u32;
        while self.resizing.load(Ordering::Acquire) && self.owner.load(Ordering::Acquire) != self_id {
            spins += 1;
            if spins > SPIN_LIMIT {
                log::trace!("RefinableSet wait gate yielding after {} spins", spins);
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Acquires the bucket lock for `elem`, retrying the whole
    /// wait/read/lock sequence if a resize's version bump is observed
    /// between index computation and lock acquisition (steps 1-4 of
    /// the per-operation protocol).
    ///
    /// The returned guard borrows from the `Buckets` array this op
    /// observed. That array is never deallocated while `self` is
    /// alive — a concurrent resize retires it into `self.retired`
    /// instead of dropping it — so the borrow is sound even if the
    /// version check below forces a retry against a newer array.
    fn lock_bucket_for<'a>(&'a self, elem: &T) -> (MutexGuard<'a, Vec<T>>, usize) {
        loop {
            self.wait_for_resize();
            let ver_before = self.version.load(Ordering::Acquire);

            let buckets = unsafe { &*self.buckets.load(Ordering::Acquire) };
            let cap = buckets.len();
            let idx = bucket_index(&self.hash_builder, elem, cap);
            let guard = buckets.slots[idx].lock().unwrap();

            if self.version.load(Ordering::Acquire) != ver_before {
                drop(guard);
                continue;
            }
            return (guard, cap);
        }
    }

    fn resize(&self, new_cap: usize) {
        let _resize_guard = self.resize_mutex.lock().unwrap();
        let new_cap = normalize_capacity(new_cap);
        let current_ptr = self.buckets.load(Ordering::Acquire);
        let current = unsafe { &*current_ptr }.len();
        if new_cap == current {
            return;
        }
        log::debug!("RefinableSet resize: {} -> {} buckets", current, new_cap);

        self.owner.store(current_thread_id(), Ordering::Release);
        self.resizing.store(true, Ordering::Release);

        let new_buckets = Buckets::with_capacity(new_cap);
        let old_buckets = unsafe { &*current_ptr };
        // Every old bucket lock is held for the entire migration, not
        // handed over one at a time: the wait gate above only stops ops
        // that haven't read `resizing` yet, so an op already past it
        // could otherwise lock an already-drained old bucket and act on
        // it before the version bump, losing the update even though
        // its own version check never fires. Holding every lock until
        // after the bump closes that window — any such op simply
        // blocks until the bump has happened, then retries.
        let mut old_guards: Vec<_> = old_buckets
            .slots
            .iter()
            .map(|slot| slot.lock().unwrap())
            .collect();

        for chain in old_guards.iter_mut() {
            for elem in chain.drain(..) {
                let idx = bucket_index(&self.hash_builder, &elem, new_cap);
                new_buckets.slots[idx].lock().unwrap().push(elem);
            }
        }

        let new_ptr = Box::into_raw(Box::new(new_buckets));
        self.buckets.store(new_ptr, Ordering::Release);

        self.retired
            .lock()
            .unwrap()
            .push(unsafe { Box::from_raw(current_ptr) });

        // Linearization point of the resize. Still holding every old
        // bucket lock here, so any op woken by the drop below observes
        // this bump immediately and retries against the new array.
        self.version.fetch_add(1, Ordering::AcqRel);

        drop(old_guards);

        self.resizing.store(false, Ordering::Release);
        self.owner.store(0, Ordering::Release);
        log::trace!("RefinableSet resize complete");
    }
}

impl<T, S> Set for RefinableSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Elem = T;

    fn add(&self, elem: T) -> bool {
        let (mut bucket, cap) = self.lock_bucket_for(&elem);
        if bucket.iter().any(|v| *v == elem) {
            return false;
        }
        bucket.push(elem);
        self.size.fetch_add(1, Ordering::Relaxed);
        drop(bucket);

        if !self.resizing.load(Ordering::Acquire) {
            let size = self.size.load(Ordering::Relaxed);
            if size as f64 / cap as f64 > MAX_LOAD_FACTOR {
                self.resize(cap * 2);
            }
        }
        true
    }

    fn remove(&self, elem: &T) -> bool {
        let (mut bucket, cap) = self.lock_bucket_for(elem);
        let removed = match bucket.iter().position(|v| v == elem) {
            Some(pos) => {
                bucket.remove(pos);
                self.size.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        };
        drop(bucket);

        if removed && !self.resizing.load(Ordering::Acquire) {
            let size = self.size.load(Ordering::Relaxed);
            if (size as f64 / cap as f64) < MIN_LOAD_FACTOR {
                self.resize(MIN_BUCKETS.max(cap / 2));
            }
        }
        removed
    }

    fn contains(&self, elem: &T) -> bool {
        let (bucket, _cap) = self.lock_bucket_for(elem);
        bucket.iter().any(|v| v == elem)
    }

    fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }
}

impl<T, S> Drop for RefinableSet<T, S> {
    fn drop(&mut self) {
        let ptr = self.buckets.load(Ordering::Acquire);
        // SAFETY: `self` uniquely owns this allocation; no other
        // reference to it can outlive `&mut self`. Everything in
        // `retired` drops along with this `RefinableSet`.
        unsafe {
            drop(Box::from_raw(ptr));
        }
    }
}
