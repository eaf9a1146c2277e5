/*!
 * CFS Kernel Library
 * Completely fair scheduler over an intrusive red-black run queue
 */

pub mod core;
pub mod monitoring;
pub mod process;
pub mod scheduler;

// Re-exports
pub use crate::core::{
    CpuId, KernelError, Membership, Nice, Pid, SchedulerConfig, SchedulerError, SchedulerResult,
    VRuntime,
};
pub use monitoring::{generate_run_id, init_tracing, span_cpu, span_run};
pub use process::{ProcessInfo, ProcessState};
pub use scheduler::{parent_channel, Scheduler, SchedulerStats, TickOutcome, WaitStatus};
