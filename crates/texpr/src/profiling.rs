//! Lightweight counters for cache behaviour and backend time.
//!
//! Everything here compiles to no-ops unless the `profiler` feature is enabled, so call sites
//! stay unconditional.

#[cfg(feature = "profiler")]
use std::collections::HashMap;
#[cfg(feature = "profiler")]
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
#[cfg(feature = "profiler")]
use std::time::Instant;

/// Aggregated count and wall time for one named event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub count: u64,
    pub total: Duration,
}

#[cfg(feature = "profiler")]
fn counters() -> &'static Mutex<HashMap<&'static str, CounterSnapshot>> {
    static COUNTERS: OnceLock<Mutex<HashMap<&'static str, CounterSnapshot>>> = OnceLock::new();
    COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

#[cfg(feature = "profiler")]
fn record(name: &'static str, elapsed: Duration) {
    let mut counters = counters().lock().expect("profiler counters poisoned");
    let entry = counters.entry(name).or_default();
    entry.count += 1;
    entry.total += elapsed;
}

/// Records a point event such as a plan-cache hit or eviction.
#[inline(always)]
pub fn cache_event(name: &'static str) {
    #[cfg(feature = "profiler")]
    record(name, Duration::ZERO);
    #[cfg(not(feature = "profiler"))]
    let _ = name;
}

pub struct ScopeGuard {
    #[cfg(feature = "profiler")]
    name: &'static str,
    #[cfg(feature = "profiler")]
    start: Instant,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        #[cfg(feature = "profiler")]
        record(self.name, self.start.elapsed());
    }
}

/// Times a backend call until the returned guard drops.
#[inline(always)]
pub fn backend_scope(name: &'static str) -> ScopeGuard {
    #[cfg(feature = "profiler")]
    {
        ScopeGuard {
            name,
            start: Instant::now(),
        }
    }
    #[cfg(not(feature = "profiler"))]
    {
        let _ = name;
        ScopeGuard {}
    }
}

/// Drains the counters collected so far, sorted by name.
pub fn take_counters() -> Vec<(&'static str, CounterSnapshot)> {
    #[cfg(feature = "profiler")]
    {
        let mut counters = counters().lock().expect("profiler counters poisoned");
        let mut drained: Vec<_> = counters.drain().collect();
        drained.sort_by_key(|(name, _)| *name);
        drained
    }
    #[cfg(not(feature = "profiler"))]
    {
        Vec::new()
    }
}
