use crate::domain::node::actions::ActionMode;
use crate::domain::node::node::{NodeState, PbsNode, Subnode};
use crate::domain::node::node_store::NodeKey;
use crate::domain::server::server::Server;
use crate::error::PbsError;

/// Subnodes created and deleted by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubnodeDelta {
    pub created: usize,
    pub deleted: usize,
}

impl SubnodeDelta {
    pub fn changed(&self) -> bool {
        self.created + self.deleted > 0
    }
}

impl PbsNode {
    /// Appends a free subnode at the tail.
    pub fn create_subnode(&mut self) {
        let index = self.subnodes.len() as i64;
        self.subnodes.push(Subnode { index, inuse: NodeState::FREE, jobs: Vec::new() });
        self.nsnfree += 1;
        if self.state.contains(NodeState::JOB) {
            self.clear_state(NodeState::JOB);
        }
    }

    /// Removes the last subnode.
    pub fn delete_a_subnode(&mut self) {
        let Some(last) = self.subnodes.pop() else {
            return;
        };
        if !last.inuse.contains(NodeState::JOB) {
            self.nsnfree -= 1;
        }
        if !last.jobs.is_empty() {
            log::warn!("Subnode {} of {} deleted with {} job(s) attached", last.index, self.name, last.jobs.len());
        }
    }

    /// Brings the number of subnodes to `ncpus`, minimum one. Only acts for new and
    /// altered values. Callers have already rejected removing slots that hold jobs.
    pub fn mod_node_ncpus(&mut self, ncpus: i64, mode: ActionMode) -> Result<SubnodeDelta, PbsError> {
        let mut delta = SubnodeDelta::default();
        if !matches!(mode, ActionMode::New | ActionMode::Alter) {
            return Ok(delta);
        }
        if ncpus < 0 {
            return Err(PbsError::BadAtVal);
        }
        let wanted = ncpus.max(1) as usize;

        while self.subnodes.len() > wanted {
            self.delete_a_subnode();
            delta.deleted += 1;
        }
        while self.subnodes.len() < wanted {
            self.create_subnode();
            delta.created += 1;
        }
        Ok(delta)
    }
}

impl Server {
    /// Reconciles the subnodes of `key` and flags the node table for rewrite on any change.
    pub fn mod_node_ncpus(&mut self, key: NodeKey, ncpus: i64, mode: ActionMode) -> Result<SubnodeDelta, PbsError> {
        let node = self.nodes.get_mut(key).ok_or(PbsError::UnkNode)?;
        let delta = node.mod_node_ncpus(ncpus, mode)?;
        if delta.changed() {
            self.chng_nodes_file = true;
            log::debug!("Node {} now has {} subnode(s) ({:?})", node.name, node.subnodes.len(), delta);
        }
        Ok(delta)
    }
}
