/*!
 * Process Types
 * Process states and serializable snapshots
 */

use crate::core::types::{Channel, CpuId, ExitStatus, Nice, Pid, VRuntime};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Slot is free
    Unused,
    /// Slot allocated, process not yet started
    Embryo,
    /// Blocked on a channel
    Sleeping,
    /// Waiting for a CPU
    Runnable,
    /// Executing on a CPU
    Running,
    /// Exited, waiting to be reaped
    Zombie,
}

impl ProcessState {
    /// Whether the dispatcher may pick a process in this state
    ///
    /// # Performance
    /// Hot path - evaluated for every member visited by selection
    #[inline(always)]
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Runnable)
    }

    /// Whether the slot holds a process (anything but Unused)
    #[inline(always)]
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Unused)
    }

    /// Whether the process has not exited yet and can still adopt children
    #[inline(always)]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Sleeping | Self::Runnable | Self::Running)
    }

    /// Legal lifecycle edges
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Unused, Self::Embryo)
                | (Self::Embryo, Self::Runnable)
                | (Self::Embryo, Self::Unused)
                | (Self::Runnable, Self::Running)
                | (Self::Running, Self::Runnable)
                | (Self::Running, Self::Sleeping)
                | (Self::Running, Self::Zombie)
                | (Self::Sleeping, Self::Runnable)
                | (Self::Zombie, Self::Unused)
        )
    }

    #[inline(always)]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Embryo => "embryo",
            Self::Sleeping => "sleep",
            Self::Runnable => "runble",
            Self::Running => "run",
            Self::Zombie => "zombie",
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one process, as printed by procdump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: String,
    pub state: ProcessState,
    pub vruntime: VRuntime,
    pub nice: Nice,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent: Option<Pid>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cpu: Option<CpuId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chan: Option<Channel>,
    pub killed: bool,
    pub queued: bool,
    pub cpu_time_micros: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exit_status: Option<ExitStatus>,
}

impl ProcessInfo {
    #[inline(always)]
    #[must_use]
    pub const fn cpu_time(&self) -> Duration {
        Duration::from_micros(self.cpu_time_micros)
    }
}

impl std::fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} vrt={}",
            self.pid, self.state, self.name, self.vruntime
        )
    }
}
