/*!
 * Scheduler Core Operations
 * Dispatch, tick accounting, preemption and yield
 */

use super::types::TickOutcome;
use super::weight::{validate_nice, vruntime_delta};
use super::{NodeId, SchedState, Scheduler};
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::types::{CpuId, ExitStatus, Nice, Pid};
use crate::process::ProcessState;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Exit status recorded for a process killed at a tick
pub(super) const KILLED_STATUS: ExitStatus = -1;

impl SchedState {
    /// Take the current process off `cpu`, returning it to the queue if it
    /// is still Running
    pub(super) fn put_back(&mut self, cpu: CpuId) -> SchedulerResult<Option<NodeId>> {
        let slot = self.cpu_mut(cpu)?;
        let Some(id) = slot.current.take() else {
            return Ok(None);
        };
        slot.slice_used = Duration::ZERO;

        if self.rq.procs().get(id).state() == ProcessState::Running {
            self.rq.transition(id, ProcessState::Runnable)?;
        }
        self.rq.procs_mut().set_cpu(id, None);
        Ok(Some(id))
    }

    /// Give the smallest-vruntime runnable process to an empty `cpu`
    pub(super) fn dispatch(&mut self, cpu: CpuId) -> SchedulerResult<Option<NodeId>> {
        if self.cpu(cpu)?.current.is_some() {
            return Err(SchedulerError::TreeCorrupted(format!(
                "dispatch onto busy cpu {}",
                cpu
            )));
        }

        let Some(id) = self.rq.select_next_runnable() else {
            return Ok(None);
        };
        self.rq.transition(id, ProcessState::Running)?;
        self.rq.procs_mut().set_cpu(id, Some(cpu));

        let slot = self.cpu_mut(cpu)?;
        slot.current = Some(id);
        slot.slice_used = Duration::ZERO;

        debug!(cpu, pid = self.pid_of(id), vruntime = self.rq.procs().get(id).vruntime(), "dispatched");
        Ok(Some(id))
    }

    /// Put back and select in one step
    pub(super) fn reschedule(&mut self, cpu: CpuId) -> SchedulerResult<(Option<Pid>, Option<Pid>)> {
        let prev = self.put_back(cpu)?.map(|id| self.pid_of(id));
        self.advance_min_vruntime();
        let next = self.dispatch(cpu)?.map(|id| self.pid_of(id));
        Ok((prev, next))
    }

    /// Charge `elapsed` of CPU to the process on `cpu`, reordering it if tracked
    fn charge(&mut self, cpu: CpuId, id: NodeId, elapsed: Duration) -> SchedulerResult<()> {
        let proc = self.rq.procs().get(id);
        let vruntime = proc
            .vruntime()
            .saturating_add(vruntime_delta(elapsed, proc.nice()));

        self.rq.set_vruntime(id, vruntime)?;
        self.rq.procs_mut().add_cpu_time(id, elapsed);

        let slot = self.cpu_mut(cpu)?;
        slot.slice_used = slot.slice_used.saturating_add(elapsed);

        trace!(cpu, pid = self.pid_of(id), vruntime, "tick charged");
        Ok(())
    }
}

impl Scheduler {
    /// Reschedule `cpu`: its current process (if any) goes back to the
    /// queue and the smallest-vruntime runnable process takes the CPU.
    ///
    /// Returns the pid now running, `None` if the CPU is idle.
    pub fn schedule(&self, cpu: CpuId) -> SchedulerResult<Option<Pid>> {
        let (prev, next) = self.with_state("schedule", |s| s.reschedule(cpu))?;
        self.record_dispatch(prev, next);
        Ok(next)
    }

    /// Voluntarily give up `cpu`. Fails if nothing is running there.
    pub fn yield_cpu(&self, cpu: CpuId) -> SchedulerResult<Option<Pid>> {
        let (prev, next) = self.with_state("yield", |s| {
            if s.cpu(cpu)?.current.is_none() {
                return Err(SchedulerError::NoCurrentProcess(cpu));
            }
            s.reschedule(cpu)
        })?;
        self.record_dispatch(prev, next);
        Ok(next)
    }

    /// Timer tick on `cpu` after `elapsed` of execution.
    ///
    /// The running process is charged weighted virtual runtime. Once its
    /// slice reaches the quantum and another process is runnable it is
    /// preempted. An idle CPU picks up work if there is any.
    pub fn tick(&self, cpu: CpuId, elapsed: Duration) -> SchedulerResult<TickOutcome> {
        let quantum = self.config.quantum();

        let outcome = self.with_state("tick", |s| {
            let Some(id) = s.cpu(cpu)?.current else {
                let next = s.dispatch(cpu)?.map(|id| s.pid_of(id));
                return Ok(next.map_or(TickOutcome::Idle, TickOutcome::Dispatched));
            };
            let pid = s.pid_of(id);

            s.charge(cpu, id, elapsed)?;
            s.advance_min_vruntime();

            if s.rq.procs().get(id).killed() {
                s.exit_current(cpu, KILLED_STATUS)?;
                let next = s.dispatch(cpu)?.map(|id| s.pid_of(id));
                return Ok(TickOutcome::Killed { pid, next });
            }

            if s.cpu(cpu)?.slice_used < quantum {
                return Ok(TickOutcome::Continue(pid));
            }

            // Slice used up: only switch if someone else is waiting
            if s.runnable_len() == 0 {
                s.cpu_mut(cpu)?.slice_used = Duration::ZERO;
                return Ok(TickOutcome::Continue(pid));
            }

            match s.reschedule(cpu)? {
                (_, Some(next)) if next != pid => Ok(TickOutcome::Preempted { from: pid, to: next }),
                (_, Some(_)) => Ok(TickOutcome::Continue(pid)),
                (_, None) => Err(SchedulerError::TreeCorrupted(format!(
                    "pid {} vanished during preemption on cpu {}",
                    pid, cpu
                ))),
            }
        })?;

        match outcome {
            TickOutcome::Idle => self.stats.inc_idle(),
            TickOutcome::Dispatched(_) => {
                self.stats.inc_scheduled();
                self.stats.inc_context_switches();
            }
            TickOutcome::Preempted { from, to } => {
                self.stats.inc_preemptions();
                self.record_dispatch(Some(from), Some(to));
            }
            TickOutcome::Killed { pid, next } => self.record_dispatch(Some(pid), next),
            TickOutcome::Continue(_) => {}
        }
        Ok(outcome)
    }

    /// Pid running on `cpu`
    pub fn current(&self, cpu: CpuId) -> SchedulerResult<Option<Pid>> {
        self.read_state(|s| Ok(s.cpu(cpu)?.current.map(|id| s.pid_of(id))))
    }

    /// Change a process's nice value, returning the old one.
    ///
    /// Takes effect on the next charge; the current key is left alone.
    pub fn renice(&self, pid: Pid, nice: Nice) -> SchedulerResult<Nice> {
        let nice = validate_nice(nice)?;
        self.with_state("renice", |s| {
            let id = s.rq.procs().lookup(pid)?;
            let old = s.rq.procs().get(id).nice();
            s.rq.procs_mut().set_nice(id, nice);
            info!(pid, old, nice, "process reniced");
            Ok(old)
        })
    }

    pub(super) fn record_dispatch(&self, prev: Option<Pid>, next: Option<Pid>) {
        match next {
            Some(next) => {
                self.stats.inc_scheduled();
                if prev != Some(next) {
                    self.stats.inc_context_switches();
                }
            }
            None => self.stats.inc_idle(),
        }
    }
}
