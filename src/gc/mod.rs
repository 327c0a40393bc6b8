//! Garbage collector - reference counting + cycle breaking
//!
//! Design: Counting is exact and immediate (object header); cycles of
//! strong lazy edges are broken by a synchronous trial-deletion collector
//! over per-thread candidate buffers:
//! 1. Reference counting (fast path, deterministic)
//! 2. Candidate buffering on non-final decrements
//! 3. Deferred, threshold-triggered collection (off unless configured)

mod cycles;

#[cfg(test)]
mod tests;

pub use cycles::{candidate_count, clear_candidates, collect_cycles, purge, register_candidate};

pub(crate) use crate::object::Color;

use crate::logging::{debug, info, log_gc_complete, warn};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// Global GC state (lock-free counters)
static GC_STATE: Lazy<GcState> = Lazy::new(GcState::from_config);

struct GcState {
    collection_threshold: AtomicUsize,
    auto_collect: AtomicBool,
    collections_performed: AtomicUsize,
}

impl GcState {
    fn from_config() -> Self {
        let config = &crate::config::get().gc;
        Self {
            collection_threshold: AtomicUsize::new(config.threshold.max(1)),
            auto_collect: AtomicBool::new(config.auto_collect),
            collections_performed: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn threshold(&self) -> usize {
        self.collection_threshold.load(Ordering::Relaxed)
    }

    #[inline]
    fn auto_collect(&self) -> bool {
        self.auto_collect.load(Ordering::Relaxed)
    }

    #[inline]
    fn record_collection(&self) {
        self.collections_performed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Initialize GC subsystem
pub fn init() {
    info!("GC subsystem initializing");
    Lazy::force(&GC_STATE);
    debug!(
        threshold = GC_STATE.threshold(),
        auto_collect = GC_STATE.auto_collect(),
        "GC initialized"
    );
}

/// Final collection on the calling thread
pub fn cleanup() {
    info!("GC subsystem cleanup starting");
    let collected = force_collect();
    clear_candidates();
    debug!(collected, "GC cleanup complete");
}

/// Collect once the candidate buffer has reached the threshold
pub fn maybe_collect() -> usize {
    if candidate_count() < GC_STATE.threshold() {
        return 0;
    }
    debug!(
        candidates = candidate_count(),
        threshold = GC_STATE.threshold(),
        "GC threshold exceeded, starting collection"
    );

    let start = Instant::now();
    let collected = collect_cycles();
    GC_STATE.record_collection();

    let elapsed = start.elapsed();
    if elapsed.as_millis() > 10 {
        warn!(duration_ms = elapsed.as_millis() as u64, "GC collection took significant time");
    }
    collected
}

/// Force immediate collection (for testing/profiling)
pub fn force_collect() -> usize {
    let start = Instant::now();
    let scanned = candidate_count();
    let collected = collect_cycles();
    GC_STATE.record_collection();
    log_gc_complete(start.elapsed().as_micros() as u64, collected, scanned);
    collected
}

/// Change the collection threshold at runtime
pub fn set_threshold(threshold: usize) {
    GC_STATE.collection_threshold.store(threshold.max(1), Ordering::Relaxed);
}

pub fn set_auto_collect(enabled: bool) {
    GC_STATE.auto_collect.store(enabled, Ordering::Relaxed);
}

/// Get GC statistics
pub fn stats() -> GcStats {
    GcStats {
        buffered_candidates: candidate_count(),
        candidates_scanned: cycles::TOTALS.candidates_scanned.load(Ordering::Relaxed),
        objects_collected: cycles::TOTALS.objects_collected.load(Ordering::Relaxed),
        candidates_purged: cycles::TOTALS.candidates_purged.load(Ordering::Relaxed),
        collections_run: GC_STATE.collections_performed.load(Ordering::Relaxed),
        threshold: GC_STATE.threshold(),
    }
}

/// GC statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Candidates waiting on the calling thread
    pub buffered_candidates: usize,
    pub candidates_scanned: usize,
    pub objects_collected: usize,
    pub candidates_purged: usize,
    pub collections_run: usize,
    pub threshold: usize,
}
