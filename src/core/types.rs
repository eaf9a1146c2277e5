/*!
 * Core Types
 * Common types used across the kernel
 */

/// Process ID type
pub type Pid = u32;

/// Index of a (simulated) CPU
pub type CpuId = usize;

/// Virtual runtime in weighted nanoseconds (signed, smaller is owed more CPU)
pub type VRuntime = i64;

/// Nice value (-20 highest weight, 19 lowest)
pub type Nice = i8;

/// Opaque sleep channel a process waits on
pub type Channel = u64;

/// Exit status reported by a process
pub type ExitStatus = i32;

/// Common result type for kernel operations
pub type KernelResult<T> = Result<T, super::errors::KernelError>;
