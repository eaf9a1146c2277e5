/*!
 * Lock-Free Scheduler Statistics
 * Atomic counters updated on dispatch paths without taking the run-queue lock
 */

use super::types::SchedulerStats;
use crate::core::config::Membership;
use crate::core::types::VRuntime;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Atomic scheduler statistics
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Relaxed ordering throughout; snapshots are for monitoring only
#[repr(C, align(64))]
pub struct AtomicSchedulerStats {
    total_scheduled: AtomicU64,
    context_switches: AtomicU64,
    preemptions: AtomicU64,
    idle_selections: AtomicU64,
    runnable: AtomicUsize,
    min_vruntime: AtomicI64,
    membership: Membership,
    quantum: Duration,
}

impl AtomicSchedulerStats {
    #[inline]
    pub fn new(membership: Membership, quantum: Duration) -> Self {
        Self {
            total_scheduled: AtomicU64::new(0),
            context_switches: AtomicU64::new(0),
            preemptions: AtomicU64::new(0),
            idle_selections: AtomicU64::new(0),
            runnable: AtomicUsize::new(0),
            min_vruntime: AtomicI64::new(0),
            membership,
            quantum,
        }
    }

    /// # Performance
    /// Hot path - called on every successful selection
    #[inline(always)]
    pub fn inc_scheduled(&self) {
        self.total_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// # Performance
    /// Hot path - called when a CPU changes process
    #[inline(always)]
    pub fn inc_context_switches(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_preemptions(&self) {
        self.preemptions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_idle(&self) {
        self.idle_selections.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish queue gauges computed under the lock
    #[inline]
    pub fn set_queue(&self, runnable: usize, min_vruntime: VRuntime) {
        self.runnable.store(runnable, Ordering::Relaxed);
        self.min_vruntime.store(min_vruntime, Ordering::Relaxed);
    }

    #[inline]
    pub fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            total_scheduled: self.total_scheduled.load(Ordering::Relaxed),
            context_switches: self.context_switches.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            idle_selections: self.idle_selections.load(Ordering::Relaxed),
            runnable: self.runnable.load(Ordering::Relaxed),
            min_vruntime: self.min_vruntime.load(Ordering::Relaxed),
            membership: self.membership,
            quantum_micros: self.quantum.as_micros() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let stats = AtomicSchedulerStats::new(Membership::RunnableOnly, Duration::from_millis(10));
        stats.inc_scheduled();
        stats.inc_scheduled();
        stats.inc_context_switches();
        stats.inc_idle();
        stats.set_queue(3, 42);

        let snap = stats.snapshot();
        assert_eq!(snap.total_scheduled, 2);
        assert_eq!(snap.context_switches, 1);
        assert_eq!(snap.preemptions, 0);
        assert_eq!(snap.idle_selections, 1);
        assert_eq!(snap.runnable, 3);
        assert_eq!(snap.min_vruntime, 42);
        assert_eq!(snap.quantum_micros, 10_000);
    }
}
