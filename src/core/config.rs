/*!
 * Scheduler Configuration
 *
 * Runtime configuration for the scheduling domain, loaded from defaults,
 * presets, environment variables or JSON
 */

use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::limits::{
    DEFAULT_NCPU, DEFAULT_NPROC, DEFAULT_QUANTUM, MAX_QUANTUM_MICROS, MIN_QUANTUM_MICROS,
    NCPU_MAX,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Whole microseconds in `d`, saturating so oversized values fail validation
#[inline]
fn duration_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Which process states are kept in the run queue tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    /// Only Runnable processes are members; selection is the tree minimum
    #[default]
    RunnableOnly,
    /// Running processes stay in the tree and are skipped by selection
    IncludeRunning,
}

impl FromStr for Membership {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "runnable_only" | "runnable" => Ok(Self::RunnableOnly),
            "include_running" | "running" => Ok(Self::IncludeRunning),
            _ => Err(SchedulerError::InvalidConfig(format!(
                "invalid membership '{}'. Valid: runnable_only, include_running",
                s
            ))),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Number of simulated CPUs
    pub ncpu: usize,
    /// Process table capacity
    pub nproc: usize,
    /// Time slice before a tick may preempt
    pub quantum_micros: u64,
    /// Tree membership discipline
    pub membership: Membership,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ncpu: DEFAULT_NCPU,
            nproc: DEFAULT_NPROC,
            quantum_micros: duration_micros(DEFAULT_QUANTUM),
            membership: Membership::RunnableOnly,
        }
    }
}

impl SchedulerConfig {
    /// Short slices for latency-sensitive workloads
    pub fn interactive() -> Self {
        Self {
            quantum_micros: 4_000,
            ..Self::default()
        }
    }

    /// Long slices for throughput
    pub fn batch() -> Self {
        Self {
            quantum_micros: 50_000,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_ncpu(mut self, ncpu: usize) -> Self {
        self.ncpu = ncpu;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_nproc(mut self, nproc: usize) -> Self {
        self.nproc = nproc;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_quantum(mut self, quantum: Duration) -> Self {
        self.quantum_micros = duration_micros(quantum);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_membership(mut self, membership: Membership) -> Self {
        self.membership = membership;
        self
    }

    #[inline(always)]
    pub const fn quantum(&self) -> Duration {
        Duration::from_micros(self.quantum_micros)
    }

    /// Check bounds on every field
    pub fn validate(&self) -> SchedulerResult<()> {
        if !(MIN_QUANTUM_MICROS..=MAX_QUANTUM_MICROS).contains(&self.quantum_micros) {
            return Err(SchedulerError::InvalidConfig(format!(
                "quantum {}μs must be between 1ms ({}μs) and 1s ({}μs)",
                self.quantum_micros, MIN_QUANTUM_MICROS, MAX_QUANTUM_MICROS
            )));
        }
        if self.ncpu == 0 || self.ncpu > NCPU_MAX {
            return Err(SchedulerError::InvalidConfig(format!(
                "ncpu {} must be between 1 and {}",
                self.ncpu, NCPU_MAX
            )));
        }
        if self.nproc == 0 || self.nproc > u32::MAX as usize {
            return Err(SchedulerError::InvalidConfig(format!(
                "nproc {} out of range",
                self.nproc
            )));
        }
        Ok(())
    }

    /// Load overrides from the environment on top of the defaults
    ///
    /// Environment variables:
    /// - KERNEL_NCPU: number of CPUs
    /// - KERNEL_NPROC: process table capacity
    /// - KERNEL_QUANTUM_MICROS: time slice in microseconds
    /// - KERNEL_SCHED_MEMBERSHIP: runnable_only | include_running
    pub fn from_env() -> SchedulerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> SchedulerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("KERNEL_NCPU") {
            config.ncpu = parse_var("KERNEL_NCPU", &v)?;
        }
        if let Some(v) = lookup("KERNEL_NPROC") {
            config.nproc = parse_var("KERNEL_NPROC", &v)?;
        }
        if let Some(v) = lookup("KERNEL_QUANTUM_MICROS") {
            config.quantum_micros = parse_var("KERNEL_QUANTUM_MICROS", &v)?;
        }
        if let Some(v) = lookup("KERNEL_SCHED_MEMBERSHIP") {
            config.membership = v.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> SchedulerResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SchedulerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> SchedulerResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SchedulerError::InvalidConfig(format!("{}={} is not a number", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
        assert!(SchedulerConfig::interactive().validate().is_ok());
        assert!(SchedulerConfig::batch().validate().is_ok());
    }

    #[test]
    fn test_quantum_validation() {
        let too_small = SchedulerConfig::default().with_quantum(Duration::from_micros(500));
        assert!(too_small.validate().is_err());

        let too_large = SchedulerConfig::default().with_quantum(Duration::from_secs(2));
        assert!(too_large.validate().is_err());

        let min = SchedulerConfig::default().with_quantum(Duration::from_millis(1));
        assert!(min.validate().is_ok());
    }

    #[test]
    fn test_huge_quantum_saturates() {
        // 2^64 + 10_000 micros; a wrapping cast would leave a valid 10ms
        let huge = Duration::new(18_446_744_073_709, 561_616_000);
        let config = SchedulerConfig::default().with_quantum(huge);
        assert_eq!(config.quantum_micros, u64::MAX);
        assert!(config.validate().is_err());

        let config = SchedulerConfig::default().with_quantum(Duration::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cpu_bounds() {
        assert!(SchedulerConfig::default().with_ncpu(0).validate().is_err());
        assert!(SchedulerConfig::default()
            .with_ncpu(NCPU_MAX + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("KERNEL_NCPU", "4"),
            ("KERNEL_QUANTUM_MICROS", "20000"),
            ("KERNEL_SCHED_MEMBERSHIP", "include_running"),
        ]
        .into_iter()
        .collect();

        let config =
            SchedulerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.ncpu, 4);
        assert_eq!(config.nproc, DEFAULT_NPROC);
        assert_eq!(config.quantum(), Duration::from_millis(20));
        assert_eq!(config.membership, Membership::IncludeRunning);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = SchedulerConfig::from_lookup(|k| {
            (k == "KERNEL_NPROC").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_json_partial() {
        let config = SchedulerConfig::from_json(r#"{"nproc": 16}"#).unwrap();
        assert_eq!(config.nproc, 16);
        assert_eq!(config.ncpu, DEFAULT_NCPU);
        assert_eq!(config.membership, Membership::RunnableOnly);

        assert!(SchedulerConfig::from_json(r#"{"quantum_micros": 5}"#).is_err());
    }
}
