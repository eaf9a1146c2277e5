/*!
 * Process Table
 * Fixed-capacity slots of process records with embedded run-queue links
 */

use super::types::{ProcessInfo, ProcessState};
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::limits::INIT_PID;
use crate::core::types::{Channel, CpuId, ExitStatus, Nice, Pid, VRuntime};
use crate::scheduler::rbtree::{NodeId, NodeStore, RbLinks};
use ahash::AHashMap;
use std::time::Duration;
use tracing::debug;

/// Per-process record
///
/// The run-queue links live inside the record; the tree only rewires them.
#[derive(Debug, Clone)]
pub struct Proc {
    pid: Pid,
    name: String,
    state: ProcessState,
    vruntime: VRuntime,
    nice: Nice,
    parent: Option<Pid>,
    chan: Option<Channel>,
    killed: bool,
    exit_status: Option<ExitStatus>,
    cpu: Option<CpuId>,
    cpu_time: Duration,
    rb: RbLinks,
}

impl Proc {
    fn unused() -> Self {
        Self {
            pid: 0,
            name: String::new(),
            state: ProcessState::Unused,
            vruntime: 0,
            nice: 0,
            parent: None,
            chan: None,
            killed: false,
            exit_status: None,
            cpu: None,
            cpu_time: Duration::ZERO,
            rb: RbLinks::default(),
        }
    }

    #[inline(always)]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    #[inline(always)]
    pub fn vruntime(&self) -> VRuntime {
        self.vruntime
    }

    #[inline(always)]
    pub fn nice(&self) -> Nice {
        self.nice
    }

    #[inline(always)]
    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    #[inline(always)]
    pub fn chan(&self) -> Option<Channel> {
        self.chan
    }

    #[inline(always)]
    pub fn killed(&self) -> bool {
        self.killed
    }

    #[inline(always)]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    #[inline(always)]
    pub fn cpu(&self) -> Option<CpuId> {
        self.cpu
    }

    #[inline(always)]
    pub fn cpu_time(&self) -> Duration {
        self.cpu_time
    }

    /// Whether the record is currently linked into a run queue
    #[inline(always)]
    pub fn is_queued(&self) -> bool {
        self.rb.is_linked()
    }
}

/// Table of process slots; slot index doubles as the tree handle
#[derive(Debug)]
pub struct ProcessTable {
    slots: Vec<Proc>,
    index: AHashMap<Pid, NodeId>,
    next_pid: Pid,
}

impl ProcessTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Proc::unused()).collect(),
            index: AHashMap::with_capacity(capacity),
            next_pid: INIT_PID,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live (non-Unused) processes
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Claim a free slot: Unused -> Embryo with a fresh pid
    pub fn alloc(&mut self, name: &str, parent: Option<Pid>, nice: Nice) -> SchedulerResult<NodeId> {
        let slot = self
            .slots
            .iter()
            .position(|p| p.state == ProcessState::Unused)
            .ok_or(SchedulerError::TableFull(self.slots.len()))?;

        let pid = self.next_pid;
        self.next_pid = self.next_pid.wrapping_add(1).max(INIT_PID);

        let id = NodeId::new(slot as u32);
        let proc = &mut self.slots[slot];
        *proc = Proc::unused();
        proc.pid = pid;
        proc.name = name.to_string();
        proc.state = ProcessState::Embryo;
        proc.nice = nice;
        proc.parent = parent;
        self.index.insert(pid, id);

        debug!(pid, slot, name, "process slot allocated");
        Ok(id)
    }

    /// Return a slot to Unused. The record must not be queued.
    pub fn release(&mut self, id: NodeId) -> SchedulerResult<()> {
        let proc = &self.slots[id.index()];
        if proc.rb.is_linked() {
            return Err(SchedulerError::AlreadyQueued(proc.pid));
        }
        self.set_state(id, ProcessState::Unused)?;

        let proc = &mut self.slots[id.index()];
        let pid = proc.pid;
        self.index.remove(&pid);
        *proc = Proc::unused();

        debug!(pid, slot = id.index(), "process slot released");
        Ok(())
    }

    /// Handle for a live pid
    pub fn lookup(&self, pid: Pid) -> SchedulerResult<NodeId> {
        self.index
            .get(&pid)
            .copied()
            .ok_or(SchedulerError::ProcessNotFound(pid))
    }

    #[inline(always)]
    pub fn get(&self, id: NodeId) -> &Proc {
        &self.slots[id.index()]
    }

    /// Move a process along a legal lifecycle edge; returns the previous state.
    ///
    /// Membership is not touched here; see `RunQueue::transition`.
    pub fn set_state(&mut self, id: NodeId, to: ProcessState) -> SchedulerResult<ProcessState> {
        let proc = &mut self.slots[id.index()];
        let from = proc.state;
        if !from.can_transition_to(to) {
            return Err(SchedulerError::InvalidTransition {
                pid: proc.pid,
                from,
                to,
            });
        }
        proc.state = to;
        Ok(from)
    }

    pub fn set_chan(&mut self, id: NodeId, chan: Option<Channel>) {
        self.slots[id.index()].chan = chan;
    }

    pub fn set_killed(&mut self, id: NodeId) {
        self.slots[id.index()].killed = true;
    }

    pub fn set_exit_status(&mut self, id: NodeId, status: ExitStatus) {
        self.slots[id.index()].exit_status = Some(status);
    }

    pub fn set_parent(&mut self, id: NodeId, parent: Option<Pid>) {
        self.slots[id.index()].parent = parent;
    }

    pub fn set_nice(&mut self, id: NodeId, nice: Nice) {
        self.slots[id.index()].nice = nice;
    }

    pub fn set_cpu(&mut self, id: NodeId, cpu: Option<CpuId>) {
        self.slots[id.index()].cpu = cpu;
    }

    pub fn add_cpu_time(&mut self, id: NodeId, elapsed: Duration) {
        let proc = &mut self.slots[id.index()];
        proc.cpu_time = proc.cpu_time.saturating_add(elapsed);
    }

    /// Rewrite the key. Only valid while the record is not linked.
    pub(crate) fn set_vruntime(&mut self, id: NodeId, vruntime: VRuntime) -> SchedulerResult<()> {
        let proc = &mut self.slots[id.index()];
        if proc.rb.is_linked() {
            return Err(SchedulerError::AlreadyQueued(proc.pid));
        }
        proc.vruntime = vruntime;
        Ok(())
    }

    /// Live processes in slot order
    pub fn iter_live(&self) -> impl Iterator<Item = (NodeId, &Proc)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state.is_live())
            .map(|(i, p)| (NodeId::new(i as u32), p))
    }

    /// Snapshot for procdump
    pub fn info(&self, id: NodeId) -> ProcessInfo {
        let p = self.get(id);
        ProcessInfo {
            pid: p.pid,
            name: p.name.clone(),
            state: p.state,
            vruntime: p.vruntime,
            nice: p.nice,
            parent: p.parent,
            cpu: p.cpu,
            chan: p.chan,
            killed: p.killed,
            queued: p.rb.is_linked(),
            cpu_time_micros: p.cpu_time.as_micros() as u64,
            exit_status: p.exit_status,
        }
    }
}

impl NodeStore for ProcessTable {
    #[inline(always)]
    fn links(&self, id: NodeId) -> &RbLinks {
        &self.slots[id.index()].rb
    }

    #[inline(always)]
    fn links_mut(&mut self, id: NodeId) -> &mut RbLinks {
        &mut self.slots[id.index()].rb
    }

    #[inline(always)]
    fn key(&self, id: NodeId) -> VRuntime {
        self.slots[id.index()].vruntime
    }
}
