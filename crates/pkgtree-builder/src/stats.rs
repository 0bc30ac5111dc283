//! Enumeration statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Point-in-time view of builder activity since the last reload.
#[derive(Debug, Clone, Default)]
pub struct BuilderProgress {
    /// References handed to workers.
    pub references_dispatched: u64,
    /// Hard references whose expansion finished.
    pub references_enumerated: u64,
    /// Children discovered across all expansions.
    pub children_discovered: u64,
    /// Overlays created for paths provided by several packages.
    pub overlays_created: u64,
    /// Expansions that failed and were reverted.
    pub failures: u64,
    /// References waiting in the work queue.
    pub queued: usize,
    /// References blocked on their parent.
    pub waiting: usize,
    /// References currently dispatched.
    pub in_flight: usize,
    /// Time elapsed since the last reload.
    pub elapsed: Duration,
}

impl BuilderProgress {
    /// Expansions per second since the last reload.
    pub fn references_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.references_enumerated as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Whether any expansion failed.
    pub fn has_failures(&self) -> bool {
        self.failures > 0
    }
}

/// Counters updated by workers and the dispatch loop.
#[derive(Debug)]
pub struct BuilderStats {
    dispatched: AtomicU64,
    enumerated: AtomicU64,
    discovered: AtomicU64,
    overlays: AtomicU64,
    failures: AtomicU64,
    started: Mutex<Instant>,
}

impl Default for BuilderStats {
    fn default() -> Self {
        Self {
            dispatched: AtomicU64::new(0),
            enumerated: AtomicU64::new(0),
            discovered: AtomicU64::new(0),
            overlays: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            started: Mutex::new(Instant::now()),
        }
    }
}

impl BuilderStats {
    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expansion(&self, children: usize, overlays: usize) {
        self.enumerated.fetch_add(1, Ordering::Relaxed);
        self.discovered.fetch_add(children as u64, Ordering::Relaxed);
        self.overlays.fetch_add(overlays as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter and restart the clock.
    pub fn reset(&self) {
        self.dispatched.store(0, Ordering::Relaxed);
        self.enumerated.store(0, Ordering::Relaxed);
        self.discovered.store(0, Ordering::Relaxed);
        self.overlays.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        *self.started.lock() = Instant::now();
    }

    /// Counter snapshot; queue depths are filled in by the caller.
    pub fn snapshot(&self) -> BuilderProgress {
        BuilderProgress {
            references_dispatched: self.dispatched.load(Ordering::Relaxed),
            references_enumerated: self.enumerated.load(Ordering::Relaxed),
            children_discovered: self.discovered.load(Ordering::Relaxed),
            overlays_created: self.overlays.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            elapsed: self.started.lock().elapsed(),
            ..BuilderProgress::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let stats = BuilderStats::default();
        stats.record_dispatch();
        stats.record_expansion(3, 1);
        stats.record_failure();

        let progress = stats.snapshot();
        assert_eq!(progress.references_dispatched, 1);
        assert_eq!(progress.references_enumerated, 1);
        assert_eq!(progress.children_discovered, 3);
        assert_eq!(progress.overlays_created, 1);
        assert!(progress.has_failures());

        stats.reset();
        let progress = stats.snapshot();
        assert_eq!(progress.references_enumerated, 0);
        assert!(!progress.has_failures());
    }

    #[test]
    fn test_rate_with_zero_elapsed() {
        let progress = BuilderProgress::default();
        assert_eq!(progress.references_per_second(), 0.0);
    }
}
