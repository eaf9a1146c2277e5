/*!
 * System Limits and Constants
 *
 * Centralized location for scheduler-wide limits, defaults and tuning values.
 * Performance-critical constants are marked with [PERF].
 */

use crate::core::types::Pid;
use std::time::Duration;

// =============================================================================
// PROCESS TABLE
// =============================================================================

/// Default number of process slots
pub const DEFAULT_NPROC: usize = 64;

/// Pid handed to the first process; orphans are reparented to it
pub const INIT_PID: Pid = 1;

// =============================================================================
// CPUS
// =============================================================================

/// Default number of simulated CPUs
pub const DEFAULT_NCPU: usize = 2;

/// Upper bound on simulated CPUs
pub const NCPU_MAX: usize = 8;

// =============================================================================
// TIME SLICES
// =============================================================================

/// Default time quantum (10ms)
/// [PERF] Long enough to amortize a switch, short enough for interactivity
pub const DEFAULT_QUANTUM: Duration = Duration::from_millis(10);

/// Smallest accepted quantum (1ms)
pub const MIN_QUANTUM_MICROS: u64 = 1_000;

/// Largest accepted quantum (1s)
pub const MAX_QUANTUM_MICROS: u64 = 1_000_000;

// =============================================================================
// WEIGHTS
// =============================================================================

/// Weight of a nice-0 process; vruntime advances at wall-clock rate for it
pub const NICE_0_WEIGHT: u64 = 1024;

pub const MIN_NICE: i8 = -20;
pub const MAX_NICE: i8 = 19;
pub const DEFAULT_NICE: i8 = 0;
