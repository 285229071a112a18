use crate::domain::attribute::value::AttrValue;
use crate::domain::license::license::LicenseBackend;
use crate::domain::mom::mom_store::MomKey;
use crate::domain::node::node::{LICENSED_LOCKED, NodeAttr, NodeModified};
use crate::domain::node::node_store::NodeKey;
use crate::domain::server::server::Server;
use crate::error::PbsError;

impl Server {
    /// Removes a node for good. Callers make sure no job runs on it.
    ///
    /// The Mom of a natural vnode goes with it when that Mom owns nothing else the node
    /// depends on; any other vnode is only unlinked from its Moms. The store row and the
    /// topology file are deleted before the node leaves the table.
    pub fn effective_node_delete(&mut self, key: NodeKey) -> Result<(), PbsError> {
        let node = self.nodes.get_mut(key).ok_or(PbsError::UnkNode)?;
        let name = node.name.to_string();

        while !node.subnodes.is_empty() {
            node.delete_a_subnode();
        }

        let mut released = false;
        if node.attr(NodeAttr::License).as_char() == Some(LICENSED_LOCKED) {
            let held = node.attr(NodeAttr::LicenseInfo).as_long().unwrap_or(0);
            self.licenses.release(held);
            released = true;
            log::debug!("node {} released {} license(s)", name, held);
        }
        node.attr_mut(NodeAttr::License).clear();

        let moms = node.moms.clone();
        let natural_of = match moms.as_slice() {
            [only] if self.moms.get(*only).and_then(|m| m.natural_vnode()) == Some(key) => Some(*only),
            _ => None,
        };
        match natural_of {
            Some(mkey) => {
                self.moms.remove_from_pool(mkey);
                self.remove_mom_from_vnodes(mkey);
                self.moms.delete_addresses(mkey);
                if let Some(mom) = self.moms.remove(mkey) {
                    log::debug!("Mom {}:{} removed with its natural vnode", mom.host, mom.port);
                }
            }
            None => self.remove_vnode_from_moms(key),
        }

        if let Err(e) = self.node_delete_db(&name) {
            log::error!("delete of node {} from datastore failed: {}", name, e);
        }
        self.remove_node_topology(&name);
        self.nodes.remove(key);
        log::info!("Node {} deleted", name);

        if released {
            self.license_more_nodes();
        }
        Ok(())
    }

    /// Drops `key` from the child list of every Mom that reports it.
    pub fn remove_vnode_from_moms(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        for mkey in &node.moms {
            if let Some(mom) = self.moms.get_mut(*mkey) {
                mom.children.retain(|child| *child != key);
            }
        }
    }

    /// Unlinks a Mom from the vnodes it reports besides its natural vnode, removing the
    /// host from their Mom list.
    pub fn remove_mom_from_vnodes(&mut self, mkey: MomKey) {
        let Some(mom) = self.moms.get(mkey) else {
            return;
        };
        if mom.children.len() <= 1 {
            return;
        }
        let host = mom.host.clone();
        let children: Vec<NodeKey> = mom.children.iter().skip(1).copied().collect();

        for child in children {
            let Some(node) = self.nodes.get_mut(child) else {
                continue;
            };
            node.moms.retain(|m| *m != mkey);
            let remaining: Vec<String> = node.attr(NodeAttr::Mom).as_str_array().iter().filter(|h| **h != host).cloned().collect();
            if node.hostname == host {
                node.hostname = remaining.first().cloned().unwrap_or_default();
            }
            node.attr_mut(NodeAttr::Mom).set(AttrValue::StrArray(remaining));
            node.modified.insert(NodeModified::UPDATE_MOM);
        }
        if let Some(mom) = self.moms.get_mut(mkey) {
            mom.children.truncate(1);
        }
    }

    /// Licenses nodes that reported sockets but could not get licenses earlier.
    pub fn license_more_nodes(&mut self) {
        let backend = if self.licenses.is_up(LicenseBackend::Sockets) { LicenseBackend::Sockets } else { LicenseBackend::Nodes };
        if !self.licenses.is_up(backend) {
            return;
        }
        for key in self.nodes.keys() {
            let Some(node) = self.nodes.get_mut(key) else {
                continue;
            };
            if node.attr(NodeAttr::License).as_char() == Some(LICENSED_LOCKED) {
                continue;
            }
            let wanted = node.attr(NodeAttr::LicenseInfo).as_long().unwrap_or(0);
            if wanted <= 0 || !self.licenses.consume(wanted) {
                continue;
            }
            node.attr_mut(NodeAttr::License).set(AttrValue::Char(LICENSED_LOCKED));
            node.modified.insert(NodeModified::UPDATE_OTHERS);
            log::debug!("node {} assigned {} license(s)", node.name, wanted);
        }
    }
}
