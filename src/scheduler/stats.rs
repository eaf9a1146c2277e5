/*!
 * Scheduler Statistics
 * Counters, process dumps and invariant checks
 */

use super::types::{CpuSnapshot, SchedulerStats};
use super::Scheduler;
use crate::core::errors::SchedulerResult;
use crate::core::types::{Pid, VRuntime};
use crate::process::ProcessInfo;
use tracing::debug;

impl Scheduler {
    /// Get scheduler statistics (lock-free snapshot)
    pub fn stats(&self) -> SchedulerStats {
        self.stats.snapshot()
    }

    /// Snapshot of every live process in slot order
    pub fn procdump(&self) -> Vec<ProcessInfo> {
        self.read_state(|s| {
            s.rq.procs()
                .iter_live()
                .map(|(id, _)| s.rq.procs().info(id))
                .collect()
        })
    }

    pub fn process_info(&self, pid: Pid) -> SchedulerResult<ProcessInfo> {
        self.read_state(|s| {
            let id = s.rq.procs().lookup(pid)?;
            Ok(s.rq.procs().info(id))
        })
    }

    /// Number of processes waiting for a CPU
    pub fn runnable_len(&self) -> usize {
        self.read_state(|s| s.runnable_len())
    }

    /// Number of live processes
    pub fn process_count(&self) -> usize {
        self.read_state(|s| s.rq.procs().len())
    }

    pub fn min_vruntime(&self) -> VRuntime {
        self.read_state(|s| s.rq.min_vruntime())
    }

    /// What each CPU is running
    pub fn cpus(&self) -> Vec<CpuSnapshot> {
        self.read_state(|s| {
            s.cpus
                .iter()
                .enumerate()
                .map(|(cpu, slot)| CpuSnapshot {
                    cpu,
                    current: slot.current.map(|id| s.pid_of(id)),
                    slice_used_micros: slot.slice_used.as_micros() as u64,
                })
                .collect()
        })
    }

    /// Full red-black and membership verification under the lock.
    ///
    /// Returns the tree's black height. A failure is fatal and halts the
    /// scheduler.
    pub fn check_invariants(&self) -> SchedulerResult<usize> {
        let height = self.with_state("check_invariants", |s| s.rq.verify())?;
        debug!(height, "run queue verified");
        Ok(height)
    }
}
