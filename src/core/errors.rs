/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::{CpuId, Pid};
use crate::process::ProcessState;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scheduler operation result
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-related errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SchedulerError {
    #[error("Process {0} not found")]
    #[diagnostic(
        code(scheduler::process_not_found),
        help("The process may have been reaped or never existed. Check PID validity.")
    )]
    ProcessNotFound(Pid),

    #[error("Process table full ({0} slots)")]
    #[diagnostic(
        code(scheduler::table_full),
        help("Reap zombie processes or raise KERNEL_NPROC.")
    )]
    TableFull(usize),

    #[error("CPU {0} does not exist")]
    #[diagnostic(code(scheduler::invalid_cpu))]
    InvalidCpu(CpuId),

    #[error("No process running on CPU {0}")]
    #[diagnostic(code(scheduler::no_current))]
    NoCurrentProcess(CpuId),

    #[error("Invalid state transition for process {pid}: {from:?} -> {to:?}")]
    #[diagnostic(
        code(scheduler::invalid_transition),
        help("Operation cannot be performed in the current process state.")
    )]
    InvalidTransition {
        pid: Pid,
        from: ProcessState,
        to: ProcessState,
    },

    #[error("Nice value {0} out of range")]
    #[diagnostic(code(scheduler::invalid_nice), help("Nice must be between -20 and 19."))]
    InvalidNice(i8),

    #[error("Invalid scheduler configuration: {0}")]
    #[diagnostic(code(scheduler::invalid_config))]
    InvalidConfig(String),

    #[error("Process {0} is already in the run queue")]
    #[diagnostic(
        code(scheduler::already_queued),
        help("Double insertion breaks tree membership; this is a kernel bug.")
    )]
    AlreadyQueued(Pid),

    #[error("Process {0} is not in the run queue")]
    #[diagnostic(
        code(scheduler::not_queued),
        help("Deleting a non-member breaks the tree; this is a kernel bug.")
    )]
    NotQueued(Pid),

    #[error("Run queue corrupted: {0}")]
    #[diagnostic(code(scheduler::tree_corrupted))]
    TreeCorrupted(String),

    #[error("Scheduler halted after a fatal error")]
    #[diagnostic(
        code(scheduler::halted),
        help("A run queue contract was violated earlier. See the error log for the cause.")
    )]
    Halted,
}

impl SchedulerError {
    /// Contract violations that must stop the scheduling subsystem
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AlreadyQueued(_) | Self::NotQueued(_) | Self::TreeCorrupted(_)
        )
    }
}

/// Unified kernel error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum KernelError {
    #[error("Scheduler error: {0}")]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(kernel::serialization))]
    Serialization(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    #[diagnostic(code(kernel::join))]
    Join(#[from] tokio::task::JoinError),
}
