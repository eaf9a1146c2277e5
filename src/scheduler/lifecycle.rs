/*!
 * Process Lifecycle
 * Spawn, sleep/wakeup on channels, kill, exit, wait and reaping
 *
 * Every lifecycle edge goes through `RunQueue::transition`, which keeps tree
 * membership in step with the new state inside the same critical section.
 */

use super::types::WaitStatus;
use super::weight::validate_nice;
use super::{NodeId, SchedState, Scheduler};
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::limits::INIT_PID;
use crate::core::types::{Channel, CpuId, ExitStatus, Nice, Pid};
use crate::process::ProcessState;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Channel a parent waits on for its children
#[inline(always)]
pub const fn parent_channel(parent: Pid) -> Channel {
    parent as Channel
}

impl SchedState {
    fn take_current(&mut self, cpu: CpuId) -> SchedulerResult<NodeId> {
        let slot = self.cpu_mut(cpu)?;
        let id = slot.current.take().ok_or(SchedulerError::NoCurrentProcess(cpu))?;
        slot.slice_used = Duration::ZERO;
        self.rq.procs_mut().set_cpu(id, None);
        Ok(id)
    }

    fn current_pid(&self, cpu: CpuId) -> SchedulerResult<Pid> {
        let id = self.cpu(cpu)?.current.ok_or(SchedulerError::NoCurrentProcess(cpu))?;
        Ok(self.pid_of(id))
    }

    fn children_of(&self, parent: Pid) -> impl Iterator<Item = NodeId> + '_ {
        self.rq
            .procs()
            .iter_live()
            .filter(move |(_, p)| p.parent() == Some(parent))
            .map(|(id, _)| id)
    }

    /// Block the process on `cpu` on `chan` and hand the CPU on.
    ///
    /// Returns the sleeper and the pid dispatched in its place.
    fn sleep_current(&mut self, cpu: CpuId, chan: Channel) -> SchedulerResult<(Pid, Option<Pid>)> {
        let id = self.take_current(cpu)?;
        self.rq.procs_mut().set_chan(id, Some(chan));
        self.rq.transition(id, ProcessState::Sleeping)?;
        let pid = self.pid_of(id);
        debug!(cpu, pid, chan, "process sleeping");

        self.advance_min_vruntime();
        let next = self.dispatch(cpu)?.map(|id| self.pid_of(id));
        Ok((pid, next))
    }

    /// Make every process sleeping on `chan` runnable
    pub(super) fn wakeup(&mut self, chan: Channel) -> SchedulerResult<usize> {
        let sleepers: Vec<NodeId> = self
            .rq
            .procs()
            .iter_live()
            .filter(|(_, p)| p.state() == ProcessState::Sleeping && p.chan() == Some(chan))
            .map(|(id, _)| id)
            .collect();

        for &id in &sleepers {
            self.rq.procs_mut().set_chan(id, None);
            self.rq.transition(id, ProcessState::Runnable)?;
        }
        Ok(sleepers.len())
    }

    fn is_active(&self, pid: Pid) -> bool {
        self.rq
            .procs()
            .lookup(pid)
            .map(|id| self.rq.procs().get(id).state().is_active())
            .unwrap_or(false)
    }

    /// Give the children of `pid` to init, or orphan them if init is gone or
    /// is `pid` itself. Orphaned zombies are released. Returns how many moved.
    fn hand_over_children(&mut self, pid: Pid) -> SchedulerResult<usize> {
        let heir = (pid != INIT_PID && self.is_active(INIT_PID)).then_some(INIT_PID);
        let children: Vec<NodeId> = self.children_of(pid).collect();
        let mut zombie_handed_over = false;
        for &child in &children {
            self.rq.procs_mut().set_parent(child, heir);
            if self.rq.procs().get(child).state() == ProcessState::Zombie {
                match heir {
                    Some(_) => zombie_handed_over = true,
                    None => self.rq.procs_mut().release(child)?,
                }
            }
        }
        if let (Some(heir), true) = (heir, zombie_handed_over) {
            self.wakeup(parent_channel(heir))?;
        }
        Ok(children.len())
    }

    /// Release one zombie child of `parent`
    fn reap_child(&mut self, parent: Pid) -> SchedulerResult<Option<(Pid, ExitStatus)>> {
        let zombie = self
            .children_of(parent)
            .find(|&id| self.rq.procs().get(id).state() == ProcessState::Zombie);
        let Some(id) = zombie else {
            return Ok(None);
        };

        let proc = self.rq.procs().get(id);
        let pid = proc.pid();
        let status = proc.exit_status().unwrap_or_else(|| {
            warn!(pid, "zombie without exit status");
            0
        });
        self.rq.procs_mut().release(id)?;
        self.hand_over_children(pid)?;

        debug!(parent, pid, status, "child reaped");
        Ok(Some((pid, status)))
    }

    /// Turn the process on `cpu` into a zombie, leaving the CPU empty
    pub(super) fn exit_current(&mut self, cpu: CpuId, status: ExitStatus) -> SchedulerResult<Pid> {
        let id = self.take_current(cpu)?;
        let pid = self.pid_of(id);
        let children = self.hand_over_children(pid)?;

        self.rq.procs_mut().set_exit_status(id, status);
        self.rq.transition(id, ProcessState::Zombie)?;

        match self.rq.procs().get(id).parent() {
            Some(parent) if self.is_active(parent) => {
                self.wakeup(parent_channel(parent))?;
            }
            // Nobody will ever reap it
            _ => self.rq.procs_mut().release(id)?,
        }

        info!(pid, status, children, "process exited");
        Ok(pid)
    }
}

impl Scheduler {
    /// Create a process and make it runnable.
    ///
    /// Its vruntime starts at the queue's `min_vruntime`, so it competes
    /// fairly without starving processes that already ran.
    pub fn spawn(&self, name: &str, parent: Option<Pid>, nice: Nice) -> SchedulerResult<Pid> {
        let nice = validate_nice(nice)?;
        self.with_state("spawn", |s| {
            if let Some(parent) = parent {
                // An exited parent would never reap the child
                if !s.is_active(parent) {
                    return Err(SchedulerError::ProcessNotFound(parent));
                }
            }
            let id = s.rq.procs_mut().alloc(name, parent, nice)?;
            s.rq.transition(id, ProcessState::Runnable)?;

            let pid = s.pid_of(id);
            info!(
                pid,
                name,
                nice,
                vruntime = s.rq.procs().get(id).vruntime(),
                "process spawned"
            );
            Ok(pid)
        })
    }

    /// Put the process on `cpu` to sleep on `chan` and reschedule.
    ///
    /// Returns the pid now running on the CPU.
    pub fn sleep(&self, cpu: CpuId, chan: Channel) -> SchedulerResult<Option<Pid>> {
        let (prev, next) = self.with_state("sleep", |s| s.sleep_current(cpu, chan))?;
        self.record_dispatch(Some(prev), next);
        Ok(next)
    }

    /// Wake every process sleeping on `chan`; returns how many woke
    pub fn wakeup(&self, chan: Channel) -> SchedulerResult<usize> {
        let woken = self.with_state("wakeup", |s| s.wakeup(chan))?;
        if woken > 0 {
            debug!(chan, woken, "channel woken");
        }
        Ok(woken)
    }

    /// Mark a process killed. A sleeping victim is made runnable so it can
    /// run up to its next tick, where it exits.
    pub fn kill(&self, pid: Pid) -> SchedulerResult<()> {
        self.with_state("kill", |s| {
            let id = s.rq.procs().lookup(pid)?;
            s.rq.procs_mut().set_killed(id);

            if s.rq.procs().get(id).state() == ProcessState::Sleeping {
                s.rq.procs_mut().set_chan(id, None);
                s.rq.transition(id, ProcessState::Runnable)?;
            }
            info!(pid, "process killed");
            Ok(())
        })
    }

    /// Exit the process on `cpu` with `status` and reschedule.
    ///
    /// Children go to init, the parent is woken to reap. Returns the pid now
    /// running on the CPU.
    pub fn exit(&self, cpu: CpuId, status: ExitStatus) -> SchedulerResult<Option<Pid>> {
        let (prev, next) = self.with_state("exit", |s| {
            let prev = s.exit_current(cpu, status)?;
            s.advance_min_vruntime();
            let next = s.dispatch(cpu)?.map(|id| s.pid_of(id));
            Ok((prev, next))
        })?;
        self.record_dispatch(Some(prev), next);
        Ok(next)
    }

    /// Release one zombie child of `parent`, returning its pid and status.
    ///
    /// `Ok(None)` when no child has exited yet.
    pub fn reap(&self, parent: Pid) -> SchedulerResult<Option<(Pid, ExitStatus)>> {
        self.with_state("reap", |s| {
            s.rq.procs().lookup(parent)?;
            s.reap_child(parent)
        })
    }

    /// The process on `cpu` waits for its children.
    ///
    /// Reaps a zombie child if there is one, otherwise sleeps on the parent
    /// channel. Checking and sleeping happen under one lock, so an exit
    /// on another CPU cannot slip in between and leave the parent asleep.
    pub fn wait(&self, cpu: CpuId) -> SchedulerResult<WaitStatus> {
        let (status, switch) = self.with_state("wait", |s| {
            let parent = s.current_pid(cpu)?;
            if let Some((pid, exit_status)) = s.reap_child(parent)? {
                return Ok((WaitStatus::Reaped { pid, exit_status }, None));
            }
            if s.children_of(parent).next().is_none() {
                return Ok((WaitStatus::NoChildren, None));
            }
            let (_, next) = s.sleep_current(cpu, parent_channel(parent))?;
            Ok((WaitStatus::Sleeping, Some((parent, next))))
        })?;

        if let Some((parent, next)) = switch {
            self.record_dispatch(Some(parent), next);
        }
        Ok(status)
    }

    /// Whether `parent` has any live children
    pub fn has_children(&self, parent: Pid) -> bool {
        self.read_state(|s| s.children_of(parent).next().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SchedulerConfig;
    use crate::scheduler::TickOutcome;

    fn scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig::default().with_ncpu(1)).unwrap()
    }

    #[test]
    fn test_spawn_with_unknown_parent() {
        let s = scheduler();
        assert_eq!(
            s.spawn("orphan", Some(42), 0),
            Err(SchedulerError::ProcessNotFound(42))
        );
    }

    #[test]
    fn test_spawn_places_at_min_vruntime() {
        let s = scheduler();
        s.spawn("a", None, 0).unwrap();
        s.schedule(0).unwrap();
        for _ in 0..3 {
            s.tick(0, Duration::from_millis(4)).unwrap();
        }

        let late = s.spawn("late", None, 0).unwrap();
        let min = s.stats().min_vruntime;
        assert!(min > 0);
        assert_eq!(s.process_info(late).unwrap().vruntime, min);
    }

    #[test]
    fn test_sleep_and_wakeup() {
        let s = scheduler();
        let a = s.spawn("a", None, 0).unwrap();
        let b = s.spawn("b", None, 0).unwrap();
        s.schedule(0).unwrap();

        assert_eq!(s.sleep(0, 7), Ok(Some(b)));
        let info = s.process_info(a).unwrap();
        assert_eq!(info.state, ProcessState::Sleeping);
        assert_eq!(info.chan, Some(7));
        assert!(!info.queued);

        assert_eq!(s.wakeup(8), Ok(0));
        assert_eq!(s.wakeup(7), Ok(1));
        let info = s.process_info(a).unwrap();
        assert_eq!(info.state, ProcessState::Runnable);
        assert_eq!(info.chan, None);
        assert!(info.queued);
    }

    #[test]
    fn test_sleep_without_current() {
        let s = scheduler();
        assert_eq!(s.sleep(0, 1), Err(SchedulerError::NoCurrentProcess(0)));
    }

    #[test]
    fn test_kill_wakes_sleeper_and_exits_on_tick() {
        let s = scheduler();
        let a = s.spawn("a", None, 0).unwrap();
        s.schedule(0).unwrap();
        s.sleep(0, 3).unwrap();

        s.kill(a).unwrap();
        assert_eq!(s.process_info(a).unwrap().state, ProcessState::Runnable);

        assert_eq!(s.schedule(0), Ok(Some(a)));
        assert_eq!(
            s.tick(0, Duration::from_millis(1)),
            Ok(TickOutcome::Killed { pid: a, next: None })
        );
        // No parent, so the slot is released immediately
        assert!(s.process_info(a).is_err());
    }

    #[test]
    fn test_exit_and_reap() {
        let s = scheduler();
        let init = s.spawn("init", None, 0).unwrap();
        assert_eq!(init, INIT_PID);
        s.schedule(0).unwrap();
        s.sleep(0, parent_channel(init)).unwrap();

        let child = s.spawn("child", Some(init), 0).unwrap();
        assert_eq!(s.schedule(0), Ok(Some(child)));
        assert_eq!(s.reap(init), Ok(None));

        // Exit wakes init, which is then dispatched
        assert_eq!(s.exit(0, 3), Ok(Some(init)));
        assert_eq!(s.process_info(child).unwrap().state, ProcessState::Zombie);
        assert_eq!(s.reap(init), Ok(Some((child, 3))));
        assert!(!s.has_children(init));
        assert!(s.process_info(child).is_err());
    }

    #[test]
    fn test_exit_reparents_to_init() {
        let s = scheduler();
        let init = s.spawn("init", None, 0).unwrap();
        let mid = s.spawn("mid", Some(init), 0).unwrap();
        let leaf = s.spawn("leaf", Some(mid), 0).unwrap();

        // Run mid and exit it
        assert_eq!(s.schedule(0), Ok(Some(init)));
        s.sleep(0, 99).unwrap();
        assert_eq!(s.current(0), Ok(Some(mid)));
        s.exit(0, 0).unwrap();

        assert_eq!(s.process_info(leaf).unwrap().parent, Some(init));
        assert_eq!(s.reap(init), Ok(Some((mid, 0))));
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_spawn_rejects_exited_parent() {
        let s = scheduler();
        let init = s.spawn("init", None, 0).unwrap();
        let p = s.spawn("p", Some(init), 0).unwrap();
        assert_eq!(s.schedule(0), Ok(Some(init)));
        assert_eq!(s.sleep(0, parent_channel(init)), Ok(Some(p)));
        assert_eq!(s.exit(0, 0), Ok(Some(init)));
        assert_eq!(s.process_info(p).unwrap().state, ProcessState::Zombie);

        assert_eq!(
            s.spawn("c", Some(p), 0),
            Err(SchedulerError::ProcessNotFound(p))
        );
        assert_eq!(s.reap(init), Ok(Some((p, 0))));
        assert_eq!(s.process_count(), 1);
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_reap_hands_children_of_zombie_to_init() {
        let s = scheduler();
        let init = s.spawn("init", None, 0).unwrap();
        let p = s.spawn("p", Some(init), 0).unwrap();
        assert_eq!(s.schedule(0), Ok(Some(init)));
        assert_eq!(s.sleep(0, 99), Ok(Some(p)));
        assert_eq!(s.exit(0, 0), Ok(None));

        // A child left behind by a zombie parent
        let c = s
            .with_state("adopt", |st| {
                let id = st.rq.procs_mut().alloc("c", Some(p), 0)?;
                st.rq.transition(id, ProcessState::Runnable)?;
                Ok(st.pid_of(id))
            })
            .unwrap();

        assert_eq!(s.reap(init), Ok(Some((p, 0))));
        assert_eq!(s.process_info(c).unwrap().parent, Some(init));
        assert!(s.has_children(init));
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_wait_reaps_or_sleeps() {
        let s = scheduler();
        let init = s.spawn("init", None, 0).unwrap();
        assert_eq!(s.schedule(0), Ok(Some(init)));
        assert_eq!(s.wait(0), Ok(WaitStatus::NoChildren));

        let child = s.spawn("child", Some(init), 0).unwrap();
        assert_eq!(s.wait(0), Ok(WaitStatus::Sleeping));
        assert_eq!(s.current(0), Ok(Some(child)));
        assert_eq!(
            s.process_info(init).unwrap().chan,
            Some(parent_channel(init))
        );

        assert_eq!(s.exit(0, 7), Ok(Some(init)));
        assert_eq!(
            s.wait(0),
            Ok(WaitStatus::Reaped {
                pid: child,
                exit_status: 7
            })
        );
        assert_eq!(s.wait(0), Ok(WaitStatus::NoChildren));
    }
}
