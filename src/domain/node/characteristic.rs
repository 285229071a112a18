use crate::domain::node::node::{NodeAttr, NodeModified, NodeState, PbsNode};
use crate::domain::node::node_store::{NodeKey, NodeStore};
use crate::error::{Error, Result};

/// How much of the node's persisted form a change requires rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WriteGranularity {
    None,
    /// Only the state/comment record.
    StateFile,
    /// The whole node row.
    Full,
}

/// State captured before a mutation, checked afterwards by `chk_characteristic`.
#[derive(Debug, Clone)]
pub struct CharacteristicSnapshot {
    key: NodeKey,
    old_state: NodeState,
    consumed: bool,
}

impl NodeStore {
    pub fn save_characteristic(&self, key: NodeKey) -> Option<CharacteristicSnapshot> {
        let node = self.get(key)?;
        Some(CharacteristicSnapshot { key, old_state: node.state, consumed: false })
    }

    /// Compares the node against `snapshot` and records what must be persisted in the
    /// node's modified bits. A snapshot is good for exactly one check of the node it was taken from.
    pub fn chk_characteristic(&mut self, snapshot: &mut CharacteristicSnapshot, key: NodeKey) -> Result<WriteGranularity> {
        if snapshot.consumed || snapshot.key != key {
            snapshot.consumed = true;
            return Err(Error::CharacteristicMismatch);
        }
        snapshot.consumed = true;
        let node = self.get_mut(key).ok_or(Error::CharacteristicMismatch)?;
        Ok(check_node(node, snapshot.old_state))
    }
}

fn check_node(node: &mut PbsNode, old_state: NodeState) -> WriteGranularity {
    let mut need = WriteGranularity::None;
    node.modified = NodeModified::EMPTY;

    let new_state = node.state;
    if new_state.contains(NodeState::DELETED) && !old_state.contains(NodeState::DELETED) {
        node.modified.insert(NodeModified::UPDATE_OTHERS);
        return WriteGranularity::Full;
    }

    if (new_state ^ old_state).intersects(NodeState::OFFLINE | NodeState::OFFLINE_BY_MOM) {
        need = need.max(WriteGranularity::StateFile);
        node.modified.insert(NodeModified::UPDATE_STATE);
    }

    if node.attr(NodeAttr::Comment).is_modified() {
        need = need.max(WriteGranularity::StateFile);
        node.modified.insert(NodeModified::UPDATE_COMMENT);
    }

    let others_changed = node.attrs().any(|(which, attr)| !matches!(which, NodeAttr::Comment | NodeAttr::State) && attr.is_modified());
    if others_changed {
        need = WriteGranularity::Full;
        node.modified.insert(NodeModified::UPDATE_OTHERS);
    }

    need
}
