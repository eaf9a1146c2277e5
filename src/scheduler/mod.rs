/*!
 * CPU Scheduler
 * Completely fair scheduling over a vruntime-ordered red-black tree
 *
 * One mutex guards the run queue and the per-CPU slots together, so a
 * dispatch (put back, select, mark running) is a single critical section.
 * Counters live outside the lock in `AtomicSchedulerStats`.
 */

pub mod atomic_stats;
pub mod rbtree;
pub mod runqueue;
pub mod types;
pub mod weight;

mod lifecycle;
mod operations;
mod stats;

pub use atomic_stats::AtomicSchedulerStats;
pub use lifecycle::parent_channel;
pub use rbtree::{NodeId, NodeStore, RbLinks, RbTree, TreeError};
pub use runqueue::RunQueue;
pub use types::{CpuSnapshot, SchedulerStats, TickOutcome, WaitStatus};
pub use weight::{nice_to_weight, validate_nice, vruntime_delta};

use crate::core::config::{Membership, SchedulerConfig};
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::types::{CpuId, Pid};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Per-CPU dispatch slot
#[derive(Debug, Clone, Default)]
struct CpuState {
    current: Option<NodeId>,
    slice_used: Duration,
}

/// Everything the scheduler lock protects
#[derive(Debug)]
struct SchedState {
    rq: RunQueue,
    cpus: Vec<CpuState>,
}

impl SchedState {
    fn cpu(&self, cpu: CpuId) -> SchedulerResult<&CpuState> {
        self.cpus.get(cpu).ok_or(SchedulerError::InvalidCpu(cpu))
    }

    fn cpu_mut(&mut self, cpu: CpuId) -> SchedulerResult<&mut CpuState> {
        self.cpus.get_mut(cpu).ok_or(SchedulerError::InvalidCpu(cpu))
    }

    #[inline]
    fn pid_of(&self, id: NodeId) -> Pid {
        self.rq.procs().get(id).pid()
    }

    /// Processes currently on a CPU
    fn running(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.cpus.iter().filter_map(|c| c.current)
    }

    /// Runnable members, excluding tracked running processes
    fn runnable_len(&self) -> usize {
        match self.rq.membership() {
            Membership::RunnableOnly => self.rq.len(),
            Membership::IncludeRunning => self.rq.len().saturating_sub(self.running().count()),
        }
    }

    fn advance_min_vruntime(&mut self) {
        let running = self.cpus.iter().filter_map(|c| c.current);
        self.rq.advance_min_vruntime(running);
    }
}

/// CPU Scheduler
///
/// Cloning yields another handle to the same scheduling domain; separate
/// `Scheduler::new` calls are independent domains.
///
/// # Performance
/// - Cache-line aligned handle
/// - Lock-free atomic stats for zero-contention monitoring
#[repr(C, align(64))]
pub struct Scheduler {
    state: Arc<Mutex<SchedState>>,
    stats: Arc<AtomicSchedulerStats>,
    halted: Arc<AtomicBool>,
    config: Arc<SchedulerConfig>,
}

impl Scheduler {
    /// Create a scheduler after validating its configuration
    pub fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SchedulerConfig) -> Self {
        info!(
            ncpu = config.ncpu,
            nproc = config.nproc,
            quantum_micros = config.quantum_micros,
            membership = ?config.membership,
            "Scheduler initialized"
        );

        let state = SchedState {
            rq: RunQueue::with_membership(config.nproc, config.membership),
            cpus: vec![CpuState::default(); config.ncpu],
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            stats: Arc::new(AtomicSchedulerStats::new(config.membership, config.quantum())),
            halted: Arc::new(AtomicBool::new(false)),
            config: Arc::new(config),
        }
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[inline]
    pub fn ncpu(&self) -> usize {
        self.config.ncpu
    }

    /// Whether a contract violation has stopped this scheduler
    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Run `f` under the lock.
    ///
    /// A fatal error latches the halted flag; afterwards every mutating call
    /// fails with `Halted` and the tree is never touched again.
    fn with_state<T, F>(&self, op: &'static str, f: F) -> SchedulerResult<T>
    where
        F: FnOnce(&mut SchedState) -> SchedulerResult<T>,
    {
        if self.is_halted() {
            return Err(SchedulerError::Halted);
        }

        let mut state = self.state.lock();
        if self.is_halted() {
            return Err(SchedulerError::Halted);
        }

        let result = f(&mut state);
        match &result {
            Err(e) if e.is_fatal() => {
                self.halted.store(true, Ordering::Release);
                error!(op, error = %e, "run queue contract violated, scheduler halted");
            }
            _ => self
                .stats
                .set_queue(state.runnable_len(), state.rq.min_vruntime()),
        }
        result
    }

    /// Read-only access that still works after a halt, for diagnostics
    fn read_state<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&SchedState) -> T,
    {
        let state = self.state.lock();
        f(&state)
    }
}

impl Clone for Scheduler {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
            halted: Arc::clone(&self.halted),
            config: Arc::clone(&self.config),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::build(SchedulerConfig::default())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("halted", &self.is_halted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessState;
    use std::thread;

    fn single_cpu() -> Scheduler {
        Scheduler::new(SchedulerConfig::default().with_ncpu(1)).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SchedulerConfig::default().with_ncpu(0);
        assert!(matches!(
            Scheduler::new(config),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_clone_shares_domain() {
        let a = single_cpu();
        let b = a.clone();
        let pid = a.spawn("init", None, 0).unwrap();
        assert_eq!(b.process_info(pid).unwrap().state, ProcessState::Runnable);

        let other = single_cpu();
        assert!(other.process_info(pid).is_err());
    }

    #[test]
    fn test_fatal_error_halts() {
        let scheduler = single_cpu();
        let pid = scheduler.spawn("a", None, 0).unwrap();

        // Double insert through the raw queue is a contract violation
        let result = scheduler.with_state("test", |s| {
            let id = s.rq.procs().lookup(pid)?;
            s.rq.insert(id)
        });
        assert_eq!(result, Err(SchedulerError::AlreadyQueued(pid)));
        assert!(scheduler.is_halted());
        assert_eq!(scheduler.schedule(0), Err(SchedulerError::Halted));

        // Diagnostics still work
        assert_eq!(scheduler.procdump().len(), 1);
    }

    #[test]
    fn test_ordinary_error_does_not_halt() {
        let scheduler = single_cpu();
        assert_eq!(scheduler.schedule(5), Err(SchedulerError::InvalidCpu(5)));
        assert!(!scheduler.is_halted());
        assert_eq!(scheduler.schedule(0), Ok(None));
    }

    #[test]
    fn test_concurrent_dispatch_keeps_invariants() {
        let scheduler = Scheduler::new(SchedulerConfig::default().with_ncpu(4)).unwrap();
        for i in 0..16 {
            scheduler.spawn(&format!("w{}", i), None, (i % 5) as i8).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|cpu| {
                let s = scheduler.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        s.tick(cpu, Duration::from_millis(3)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(scheduler.check_invariants().is_ok());
        let running: Vec<_> = (0..4).filter_map(|c| scheduler.current(c).unwrap()).collect();
        assert_eq!(running.len(), 4);
        assert_eq!(scheduler.runnable_len(), 12);
    }
}
