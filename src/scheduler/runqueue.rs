/*!
 * CFS Run Queue
 * Process table plus the vruntime-ordered tree threaded through it
 *
 * A `RunQueue` is only ever reached through the scheduler's mutex guard, so
 * every multi-step operation here (delete + insert, state change + membership
 * change) completes inside one critical section.
 */

use crate::core::config::Membership;
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::types::VRuntime;
use crate::process::{ProcessState, ProcessTable};
use crate::scheduler::rbtree::{NodeId, NodeStore, RbTree, TreeError};
use tracing::{debug, trace};

/// One scheduling domain: records, their ordered index, and fairness floor
#[derive(Debug)]
pub struct RunQueue {
    procs: ProcessTable,
    tree: RbTree,
    membership: Membership,
    min_vruntime: VRuntime,
}

impl RunQueue {
    /// Empty queue over a table of `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self::with_membership(capacity, Membership::default())
    }

    pub fn with_membership(capacity: usize, membership: Membership) -> Self {
        Self {
            procs: ProcessTable::new(capacity),
            tree: RbTree::new(),
            membership,
            min_vruntime: 0,
        }
    }

    #[inline(always)]
    pub fn procs(&self) -> &ProcessTable {
        &self.procs
    }

    /// Mutable table access; keys can only change through this queue
    #[inline(always)]
    pub fn procs_mut(&mut self) -> &mut ProcessTable {
        &mut self.procs
    }

    #[inline(always)]
    pub fn tree(&self) -> &RbTree {
        &self.tree
    }

    #[inline(always)]
    pub fn membership(&self) -> Membership {
        self.membership
    }

    /// Number of tree members
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Monotonic floor that new and woken processes are placed at
    #[inline(always)]
    pub fn min_vruntime(&self) -> VRuntime {
        self.min_vruntime
    }

    /// Link a process whose key is set. Fails if it is already a member.
    pub fn insert(&mut self, id: NodeId) -> SchedulerResult<()> {
        let result = self.tree.insert(&mut self.procs, id);
        result.map_err(|e| self.tree_error(e))
    }

    /// Unlink a member. Fails if it is not a member.
    pub fn delete(&mut self, id: NodeId) -> SchedulerResult<()> {
        let result = self.tree.delete(&mut self.procs, id);
        result.map_err(|e| self.tree_error(e))
    }

    /// Change a member's key by unlinking and relinking it
    pub fn update_key_and_reinsert(&mut self, id: NodeId, new_key: VRuntime) -> SchedulerResult<()> {
        self.delete(id)?;
        self.procs.set_vruntime(id, new_key)?;
        self.insert(id)?;
        trace!(pid = self.procs.get(id).pid(), new_key, "member rekeyed");
        Ok(())
    }

    /// Set a key whether or not the process is a member
    pub fn set_vruntime(&mut self, id: NodeId, key: VRuntime) -> SchedulerResult<()> {
        if self.procs.links(id).is_linked() {
            self.update_key_and_reinsert(id, key)
        } else {
            self.procs.set_vruntime(id, key)
        }
    }

    /// Smallest-key member that is Runnable, first inserted among ties.
    ///
    /// With `RunnableOnly` membership the first member visited qualifies.
    pub fn select_next_runnable(&self) -> Option<NodeId> {
        self.tree
            .find_first(&self.procs, |id| self.procs.get(id).state().is_eligible())
    }

    /// Whether a process in `state` belongs in the tree
    #[inline]
    pub fn tracks(&self, state: ProcessState) -> bool {
        match state {
            ProcessState::Runnable => true,
            ProcessState::Running => self.membership == Membership::IncludeRunning,
            _ => false,
        }
    }

    /// Change state and bring tree membership in line with it.
    ///
    /// A process joining the tree is first placed at `min_vruntime` if it
    /// lags behind, so a long sleeper cannot monopolize the CPUs.
    pub fn transition(&mut self, id: NodeId, to: ProcessState) -> SchedulerResult<ProcessState> {
        let from = self.procs.set_state(id, to)?;
        let linked = self.procs.links(id).is_linked();

        match (linked, self.tracks(to)) {
            (false, true) => {
                let placed = self.procs.get(id).vruntime().max(self.min_vruntime);
                self.procs.set_vruntime(id, placed)?;
                self.insert(id)?;
            }
            (true, false) => self.delete(id)?,
            _ => {}
        }

        debug!(
            pid = self.procs.get(id).pid(),
            from = %from,
            to = %to,
            queued = self.procs.links(id).is_linked(),
            "process transition"
        );
        Ok(from)
    }

    /// Raise `min_vruntime` towards the smallest key still competing.
    ///
    /// `running` are the processes currently on a CPU; they may not be members.
    pub fn advance_min_vruntime<I>(&mut self, running: I)
    where
        I: IntoIterator<Item = NodeId>,
    {
        let leftmost = self.tree.first(&self.procs).map(|id| self.procs.key(id));
        let candidate = running
            .into_iter()
            .map(|id| self.procs.key(id))
            .chain(leftmost)
            .min();

        if let Some(candidate) = candidate {
            self.min_vruntime = self.min_vruntime.max(candidate);
        }
    }

    /// Verify the tree and the one-membership-per-process rule; returns black height
    pub fn verify(&self) -> SchedulerResult<usize> {
        let height = self
            .tree
            .verify(&self.procs)
            .map_err(|v| SchedulerError::TreeCorrupted(v.to_string()))?;

        let mut linked = 0;
        for (id, proc) in self.procs.iter_live() {
            let member = self.procs.links(id).is_linked();
            linked += usize::from(member);
            if member != self.tracks(proc.state()) {
                return Err(SchedulerError::TreeCorrupted(format!(
                    "pid {} in state {} has queued={}",
                    proc.pid(),
                    proc.state(),
                    member
                )));
            }
        }
        if linked != self.tree.len() {
            return Err(SchedulerError::TreeCorrupted(format!(
                "{} linked records but {} members",
                linked,
                self.tree.len()
            )));
        }
        Ok(height)
    }

    fn tree_error(&self, err: TreeError) -> SchedulerError {
        match err {
            TreeError::AlreadyLinked(id) => SchedulerError::AlreadyQueued(self.procs.get(id).pid()),
            TreeError::NotLinked(id) => SchedulerError::NotQueued(self.procs.get(id).pid()),
            other => SchedulerError::TreeCorrupted(other.to_string()),
        }
    }
}
