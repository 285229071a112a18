use std::collections::HashSet;

use crate::domain::attribute::flags::AttrFlags;
use crate::domain::mom::mom_store::MomKey;
use crate::domain::node::node::{NodeAttr, NodeModified, NodeState};
use crate::domain::node::node_store::NodeKey;
use crate::domain::persistence::connection::TrxEnd;
use crate::domain::server::server::Server;
use crate::error::{Error, Result};

impl Server {
    /// Advances the mom-info generation: a new second restarts the generation at 1.
    pub fn bump_mominfo_time(&mut self) {
        let now = self.clock.now_s();
        if now != self.mominfo_time.time {
            self.mominfo_time.time = now;
            self.mominfo_time.generation = 1;
        } else {
            self.mominfo_time.generation += 1;
        }
    }

    /// Persists every changed vnode of `mom` (all Moms when `None`) in one transaction.
    /// On success the pending changes of every live node are cleared.
    ///
    /// A failure rolls the transaction back and stops the server through the fatal handler;
    /// memory and store are never left knowingly out of step.
    pub fn save_nodes_db(&mut self, changemodtime: bool, mom: Option<MomKey>) -> Result<()> {
        if self.nodes.is_empty() || self.moms.is_empty() {
            log::error!("Server has empty nodes list");
            return Err(Error::EmptyNodeList);
        }
        if changemodtime {
            self.bump_mominfo_time();
        }

        let moms = match mom {
            Some(mkey) => vec![mkey],
            None => self.moms.keys(),
        };
        let mut children: Vec<NodeKey> = Vec::new();
        for mkey in &moms {
            for child in self.moms.get(*mkey).map(|m| m.children.as_slice()).unwrap_or_default() {
                if !children.contains(child) {
                    children.push(*child);
                }
            }
        }
        children.retain(|key| self.nodes.get(*key).is_some_and(|n| !n.state.contains(NodeState::DELETED)));
        let unwritten: Vec<NodeKey> = children.iter().copied().filter(|key| self.nodes.get(*key).is_some_and(|n| !n.written)).collect();

        if let Err(e) = self.save_nodes_trx(&children) {
            let reason = self.conn.last_error().map(str::to_string).unwrap_or_else(|| e.to_string());
            let msg = format!("Unable to save node data base {}", reason);
            log::error!("{}", msg);
            if self.conn.trx_nest() > 0 {
                if let Err(rb) = self.conn.end_trx(TrxEnd::Rollback) {
                    log::error!("rollback of node save failed: {}", rb);
                }
            }
            for key in unwritten {
                if let Some(node) = self.nodes.get_mut(key) {
                    node.written = false;
                }
            }
            self.panic_stop(&msg);
            return Err(Error::PersistenceFailure(reason));
        }

        let group_key = self.node_group_key.clone();
        for key in self.nodes.keys() {
            let Some(node) = self.nodes.get_mut(key).filter(|n| !n.state.contains(NodeState::DELETED)) else {
                continue;
            };
            node.modified = NodeModified::EMPTY;
            node.clear_modify_flags();
            if let Some(resc) = group_key.as_deref().and_then(|g| node.available_mut().find_mut(g)) {
                resc.flags.remove(AttrFlags::MODIFY);
            }
        }
        Ok(())
    }

    fn save_nodes_trx(&mut self, children: &[NodeKey]) -> Result<()> {
        self.conn.begin_trx(0, false)?;
        self.save_mominfo_time()?;

        let mut saved = HashSet::new();
        for &key in children {
            if !saved.insert(key) {
                continue;
            }
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            let modified = node.modified;
            let comment = node.attr(NodeAttr::Comment);
            let has_comment = comment.is_set() && !comment.is_default();
            let offline = node.state.intersects(NodeState::OFFLINE_ANY);
            let written = node.written;

            if modified.contains(NodeModified::UPDATE_OTHERS) {
                self.node_save_db(key)?;
                if offline || has_comment {
                    self.write_single_node_state(key)?;
                }
            } else if modified.contains(NodeModified::UPDATE_MOM) {
                self.write_single_node_mom_attr(key)?;
            } else if written && modified.intersects(NodeModified::UPDATE_STATE | NodeModified::UPDATE_COMMENT) {
                self.write_single_node_state(key)?;
            }
        }

        self.conn.end_trx(TrxEnd::Commit)?;
        Ok(())
    }
}
