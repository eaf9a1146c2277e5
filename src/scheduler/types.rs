/*!
 * Scheduler Types
 * Dispatch outcomes and statistics snapshots
 */

use crate::core::config::Membership;
use crate::core::types::{CpuId, ExitStatus, Pid, VRuntime};
use serde::{Deserialize, Serialize};

/// Result of charging one timer tick to a CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "details", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Nothing was running and nothing became runnable
    Idle,
    /// The current process keeps the CPU
    Continue(Pid),
    /// Current process used its quantum and was replaced
    Preempted { from: Pid, to: Pid },
    /// CPU was idle and picked up a runnable process
    Dispatched(Pid),
    /// Current process had been killed and exited at the tick
    Killed { pid: Pid, next: Option<Pid> },
}

impl TickOutcome {
    /// Pid on the CPU after the tick
    #[inline]
    pub const fn running(&self) -> Option<Pid> {
        match self {
            Self::Idle => None,
            Self::Continue(pid) | Self::Dispatched(pid) => Some(*pid),
            Self::Preempted { to, .. } => Some(*to),
            Self::Killed { next, .. } => *next,
        }
    }
}

/// Result of a parent waiting for its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WaitStatus {
    /// A zombie child was released
    Reaped { pid: Pid, exit_status: ExitStatus },
    /// Children are still running; the parent now sleeps on its channel
    Sleeping,
    /// Nothing to wait for
    NoChildren,
}

/// What one CPU is doing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub cpu: CpuId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub current: Option<Pid>,
    pub slice_used_micros: u64,
}

/// Scheduler statistics
///
/// # Performance
/// - Counters are read without the run-queue lock; they may be slightly
///   out of step with each other but each is exact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub total_scheduled: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub context_switches: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub preemptions: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub idle_selections: u64,
    pub runnable: usize,
    pub min_vruntime: VRuntime,
    pub membership: Membership,
    pub quantum_micros: u64,
}

#[inline]
fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}
