/*!
 * Load Weights
 * Nice-to-weight mapping and weighted virtual runtime accounting
 */

use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::limits::{MAX_NICE, MIN_NICE, NICE_0_WEIGHT};
use crate::core::types::{Nice, VRuntime};
use std::time::Duration;

/// Linux CFS weight table, index 0 is nice -20; neighbours differ by ~1.25x
const WEIGHTS: [u64; 40] = [
    88761, 71755, 56483, 46273, 36291, 29154, 23254, 18705, 14949, 11916, 9548, 7620, 6100, 4904,
    3906, 3121, 2501, 1991, 1586, 1277, 1024, 820, 655, 526, 423, 335, 272, 215, 172, 137, 110, 87,
    70, 56, 45, 36, 29, 23, 18, 15,
];

/// Validate a nice value
#[inline(always)]
pub fn validate_nice(nice: Nice) -> SchedulerResult<Nice> {
    if (MIN_NICE..=MAX_NICE).contains(&nice) {
        Ok(nice)
    } else {
        Err(SchedulerError::InvalidNice(nice))
    }
}

/// Load weight for a nice value (clamped into range)
#[inline]
pub fn nice_to_weight(nice: Nice) -> u64 {
    let idx = (i32::from(nice) - i32::from(MIN_NICE)).clamp(0, 39) as usize;
    WEIGHTS[idx]
}

/// Virtual runtime charged for `runtime` of CPU at the given nice level.
///
/// vruntime = runtime_ns * NICE_0_WEIGHT / weight, so heavier processes
/// age slower and get picked more often.
#[inline]
pub fn vruntime_delta(runtime: Duration, nice: Nice) -> VRuntime {
    let scaled = runtime.as_nanos().saturating_mul(u128::from(NICE_0_WEIGHT))
        / u128::from(nice_to_weight(nice));
    VRuntime::try_from(scaled).unwrap_or(VRuntime::MAX)
}
