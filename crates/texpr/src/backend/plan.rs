//! Memoization of prepared backend plans.
//!
//! The cache is an explicit object owned by (and usually shared between) execution contexts.
//! Entries are keyed by the full [`PlanSignature`]; hashing only selects the bucket, so two
//! signatures that differ in any field never share a plan.
//!
//! A signature has at most one prepared plan alive at a time. Eviction only drops the cache's
//! own reference: while a [`CachedPlan`] handle (for example one captured by work still queued on
//! a stream) keeps the slot alive, the next acquisition of that signature revives the slot
//! instead of preparing again.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use lru::LruCache;
use once_cell::sync::OnceCell;

use crate::backend::spec::{BackendResult, PlanSignature};
use crate::error::ExprResult;

/// Whether [`PlanCache::acquire`] reused an entry or prepared a new plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    Hit,
    Miss,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

struct PlanSlot<P> {
    plan: OnceCell<Arc<P>>,
    last_used: AtomicU64,
}

impl<P> PlanSlot<P> {
    fn new(generation: u64) -> Self {
        PlanSlot {
            plan: OnceCell::new(),
            last_used: AtomicU64::new(generation),
        }
    }
}

/// Shared handle to a prepared plan.
///
/// The handle pins its cache slot, so an evicted signature is not prepared a second time while
/// any handle to its plan is still alive.
pub struct CachedPlan<P> {
    plan: Arc<P>,
    _slot: Arc<PlanSlot<P>>,
}

impl<P> Clone for CachedPlan<P> {
    fn clone(&self) -> Self {
        CachedPlan {
            plan: Arc::clone(&self.plan),
            _slot: Arc::clone(&self._slot),
        }
    }
}

impl<P: std::fmt::Debug> std::fmt::Debug for CachedPlan<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedPlan").field("plan", &self.plan).finish_non_exhaustive()
    }
}

impl<P> Deref for CachedPlan<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.plan
    }
}

impl<P> CachedPlan<P> {
    /// Whether two handles refer to the same prepared plan.
    pub fn same(&self, other: &CachedPlan<P>) -> bool {
        Arc::ptr_eq(&self.plan, &other.plan)
    }
}

struct Entries<P> {
    lru: LruCache<PlanSignature, Arc<PlanSlot<P>>>,
    /// Evicted slots that were still referenced when they left `lru`.
    retired: HashMap<PlanSignature, Weak<PlanSlot<P>>>,
}

/// Thread-safe plan cache with optional LRU bound.
///
/// Concurrent first use of one signature runs `prepare` exactly once: the slot is inserted under
/// the map lock, and preparation itself is serialized per slot, so unrelated signatures prepare
/// in parallel. Slots evicted while a caller still holds them are found again through
/// `retired`, which closes the window between looking a slot up and initializing it.
pub struct PlanCache<P> {
    entries: Mutex<Entries<P>>,
    capacity: Option<NonZeroUsize>,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<P> PlanCache<P> {
    pub fn unbounded() -> Self {
        Self::build(LruCache::unbounded(), None)
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self::build(LruCache::new(capacity), Some(capacity))
    }

    /// Bounded when `capacity` is set, unbounded otherwise.
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        match capacity {
            Some(capacity) => Self::with_capacity(capacity),
            None => Self::unbounded(),
        }
    }

    fn build(entries: LruCache<PlanSignature, Arc<PlanSlot<P>>>, capacity: Option<NonZeroUsize>) -> Self {
        PlanCache {
            entries: Mutex::new(Entries {
                lru: entries,
                retired: HashMap::new(),
            }),
            capacity,
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.capacity
    }

    /// Number of acquisitions performed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("plan cache poisoned").lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, signature: &PlanSignature) -> bool {
        let entries = self.entries.lock().expect("plan cache poisoned");
        entries
            .lru
            .peek(signature)
            .is_some_and(|slot| slot.plan.get().is_some())
    }

    /// Generation at which `signature` was last acquired, if it is cached.
    pub fn last_used(&self, signature: &PlanSignature) -> Option<u64> {
        let entries = self.entries.lock().expect("plan cache poisoned");
        entries
            .lru
            .peek(signature)
            .map(|slot| slot.last_used.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> PlanCacheStats {
        PlanCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Evicted plans that are still referenced by outstanding handles.
    pub fn retired(&self) -> usize {
        let entries = self.entries.lock().expect("plan cache poisoned");
        entries
            .retired
            .values()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }

    /// Drops every cached entry. Plans still held by outstanding handles stay reachable until
    /// those handles are gone.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().expect("plan cache poisoned");
        let drained: Vec<_> = std::iter::from_fn(|| entries.lru.pop_lru()).collect();
        for (signature, slot) in drained {
            entries.retire(signature, slot);
        }
    }

    /// Returns the plan for `signature`, preparing it on first use.
    ///
    /// A failed `prepare` leaves the slot empty and the error is returned; the next acquisition
    /// of the same signature retries.
    pub fn acquire<F>(&self, signature: &PlanSignature, prepare: F) -> ExprResult<(CachedPlan<P>, PlanOutcome)>
    where
        F: FnOnce(&PlanSignature) -> BackendResult<P>,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = self.slot(signature, generation);
        slot.last_used.store(generation, Ordering::Relaxed);

        let mut prepared = false;
        let plan = slot.plan.get_or_try_init(|| {
            prepared = true;
            prepare(signature).map(Arc::new)
        })?;

        let handle = CachedPlan {
            plan: Arc::clone(plan),
            _slot: Arc::clone(&slot),
        };
        if prepared {
            self.misses.fetch_add(1, Ordering::Relaxed);
            crate::profiling::cache_event("plan_cache_miss");
            tracing::debug!(op = signature.op.name(), generation, "plan cache miss");
            Ok((handle, PlanOutcome::Miss))
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            crate::profiling::cache_event("plan_cache_hit");
            tracing::trace!(op = signature.op.name(), generation, "plan cache hit");
            Ok((handle, PlanOutcome::Hit))
        }
    }

    fn slot(&self, signature: &PlanSignature, generation: u64) -> Arc<PlanSlot<P>> {
        let mut entries = self.entries.lock().expect("plan cache poisoned");
        if let Some(slot) = entries.lru.get(signature) {
            return Arc::clone(slot);
        }
        let revived = entries
            .retired
            .remove(signature)
            .and_then(|slot| slot.upgrade());
        if revived.is_some() {
            tracing::debug!(op = signature.op.name(), "plan cache revived an evicted plan still in use");
        }
        let slot = revived.unwrap_or_else(|| Arc::new(PlanSlot::new(generation)));
        if let Some((evicted, evicted_slot)) = entries.lru.push(signature.clone(), Arc::clone(&slot)) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            crate::profiling::cache_event("plan_cache_evict");
            tracing::debug!(op = evicted.op.name(), "plan cache evicted least recently used plan");
            entries.retire(evicted, evicted_slot);
        }
        slot
    }
}

impl<P> Entries<P> {
    fn retire(&mut self, signature: PlanSignature, slot: Arc<PlanSlot<P>>) {
        self.retired.retain(|_, slot| slot.strong_count() > 0);
        // Only the cache held it: nothing can observe the plan any more.
        if Arc::strong_count(&slot) > 1 {
            self.retired.insert(signature, Arc::downgrade(&slot));
        }
    }
}

impl<P> Default for PlanCache<P> {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::spec::{BackendError, TransformOp};
    use crate::executor::ExecutorKind;
    use crate::tensor::{DType, Layout, Shape};

    fn signature(dims: [usize; 2]) -> PlanSignature {
        let layout = Layout::contiguous(Shape::new(dims));
        PlanSignature::new(TransformOp::Trace, DType::F32, ExecutorKind::Host, &[&layout], &[])
    }

    #[test]
    fn failed_prepare_is_retried() {
        let cache = PlanCache::<u32>::unbounded();
        let sig = signature([2, 2]);
        let err = cache
            .acquire(&sig, |_| Err(BackendError::execution("boom")))
            .unwrap_err();
        assert!(matches!(err, crate::ExprError::Backend(_)));
        assert!(!cache.contains(&sig));

        let (plan, outcome) = cache.acquire(&sig, |_| Ok(7)).unwrap();
        assert_eq!((*plan, outcome), (7, PlanOutcome::Miss));
        let (_, outcome) = cache.acquire(&sig, |_| Ok(8)).unwrap();
        assert_eq!(outcome, PlanOutcome::Hit);
    }

    #[test]
    fn last_used_tracks_generation() {
        let cache = PlanCache::<u32>::unbounded();
        let a = signature([2, 2]);
        let b = signature([3, 3]);
        cache.acquire(&a, |_| Ok(1)).unwrap();
        cache.acquire(&b, |_| Ok(2)).unwrap();
        cache.acquire(&a, |_| Ok(3)).unwrap();
        assert_eq!(cache.last_used(&a), Some(3));
        assert_eq!(cache.last_used(&b), Some(2));
        assert_eq!(cache.generation(), 3);
    }

    #[test]
    fn evicted_plan_in_use_is_revived_not_prepared_again() {
        let cache = PlanCache::<u32>::with_capacity(NonZeroUsize::MIN);
        let a = signature([2, 2]);
        let b = signature([3, 3]);

        let (held, _) = cache.acquire(&a, |_| Ok(1)).unwrap();
        cache.acquire(&b, |_| Ok(2)).unwrap();
        assert!(!cache.contains(&a));
        assert_eq!(cache.retired(), 1);

        let (again, outcome) = cache
            .acquire(&a, |_| panic!("a live plan must not be prepared twice"))
            .unwrap();
        assert_eq!(outcome, PlanOutcome::Hit);
        assert!(again.same(&held));
        assert_eq!(cache.stats().evictions, 2);

        drop((held, again));
        cache.acquire(&b, |_| Ok(3)).unwrap();
        assert_eq!(cache.retired(), 0);
        let (_, outcome) = cache.acquire(&a, |_| Ok(4)).unwrap();
        assert_eq!(outcome, PlanOutcome::Miss);
    }
}
