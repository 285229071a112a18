use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;

use crate::domain::node::node::PbsNode;
use crate::domain::utils::id::NodeName;
use crate::error::PbsError;

new_key_type! {
    pub struct NodeKey;
}

/// The server's node table: stable keys plus a dense array whose order
/// each node's `arr_index` mirrors, and a name index.
#[derive(Debug, Default)]
pub struct NodeStore {
    slots: SlotMap<NodeKey, PbsNode>,
    order: Vec<NodeKey>,
    name_index: HashMap<NodeName, NodeKey>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node to the end of the array.
    ///
    /// # Returns
    /// The key of the new node, `PbsError::NodeExist` if the name is taken.
    pub fn add(&mut self, mut node: PbsNode) -> Result<NodeKey, PbsError> {
        if self.name_index.contains_key(&node.name) {
            return Err(PbsError::NodeExist);
        }
        node.arr_index = self.order.len();
        let name = node.name.clone();
        let key = self.slots.insert(node);
        self.order.push(key);
        self.name_index.insert(name, key);
        Ok(key)
    }

    pub fn get(&self, key: NodeKey) -> Option<&PbsNode> {
        self.slots.get(key)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut PbsNode> {
        self.slots.get_mut(key)
    }

    /// Looks a node up by name. A leading `(` and anything from the first `/` on are ignored.
    pub fn find_by_name(&self, name: &str) -> Option<NodeKey> {
        let name = name.strip_prefix('(').unwrap_or(name);
        let name = name.split('/').next().unwrap_or(name);
        self.name_index.get(&NodeName::new(name)).copied()
    }

    /// Removes the node from the name index, then from the array, shifting every
    /// later entry down and renumbering it.
    pub fn remove(&mut self, key: NodeKey) -> Option<PbsNode> {
        let node = self.slots.get(key)?;
        self.name_index.remove(&node.name);

        let pos = node.arr_index;
        self.order.remove(pos);
        for (index, later) in self.order.iter().enumerate().skip(pos) {
            if let Some(shifted) = self.slots.get_mut(*later) {
                shifted.arr_index = index;
            }
        }
        self.slots.remove(key)
    }

    /// Key of the node at array position `index`.
    pub fn at(&self, index: usize) -> Option<NodeKey> {
        self.order.get(index).copied()
    }

    /// Keys in array order. A copy, so callers may mutate nodes while walking it.
    pub fn keys(&self) -> Vec<NodeKey> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, &PbsNode)> {
        self.order.iter().filter_map(|key| self.slots.get(*key).map(|node| (*key, node)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
