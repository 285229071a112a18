use crate::domain::attribute::attr_list::{AttrList, AttrListEntry};
use crate::domain::attribute::flags::AttrFlags;
use crate::domain::attribute::resource::ResourceValue;
use crate::domain::attribute::value::AttrValue;
use crate::domain::mom::mom_store::{MomKey, PBS_MOM_SERVICE_PORT};
use crate::domain::node::actions::{ActionMode, is_read_only};
use crate::domain::node::node::{NTYPE_PBS, NodeAttr, NodeModified, NodeState, PbsNode};
use crate::domain::node::node_store::NodeKey;
use crate::domain::server::server::Server;
use crate::domain::utils::id::JobId;
use crate::error::PbsError;

/// Splits a node name as given on the command line. A trailing `:ts` (or any other `:`
/// suffix) is dropped; every node is of type PBS.
pub fn process_host_name_part(objname: &str) -> Result<(String, i64), PbsError> {
    let name = objname.trim();
    let name = match name.split_once(':') {
        Some((host, suffix)) => {
            if suffix != "ts" {
                log::debug!("ignoring node type suffix '{}' on {}", suffix, host);
            }
            host
        }
        None => name,
    };
    if name.is_empty() {
        return Err(PbsError::UnkNode);
    }
    Ok((name.to_string(), NTYPE_PBS))
}

impl Server {
    /// Creates a node from `attrs` and links it to its Moms.
    ///
    /// `recovering` is set when the list comes from the store or a legacy nodes file: unknown
    /// resources are then skipped rather than rejected and server-owned attributes are restored.
    ///
    /// # Returns
    /// The key of the new node. On failure nothing of the node remains.
    pub fn create_pbs_node(&mut self, objname: &str, attrs: &AttrList, recovering: bool) -> Result<NodeKey, PbsError> {
        let (name, ntype) = process_host_name_part(objname)?;
        if self.find_nodebyname(&name).is_some() {
            return Err(PbsError::NodeExist);
        }

        let hosts = match attrs.find(NodeAttr::Mom.name(), None) {
            Some(entry) => self.decode_mom_list(&entry.value),
            None => vec![name.clone()],
        };
        if hosts.is_empty() {
            return Err(PbsError::BadAtVal);
        }
        let port = match attrs.find(NodeAttr::Port.name(), None) {
            Some(entry) => entry.value.trim().parse::<u16>().map_err(|_| PbsError::BadAtVal)?,
            None => PBS_MOM_SERVICE_PORT,
        };

        let node = PbsNode::new(name.clone(), ntype, &self.defs)?;
        let key = self.nodes.add(node)?;

        let mut created_moms = Vec::new();
        for host in &hosts {
            let existed = self.moms.find(host, port).is_some();
            let mkey = self.moms.find_or_create(host, port);
            if !existed {
                created_moms.push(mkey);
            }
            if let Some(mom) = self.moms.get_mut(mkey) {
                if *host == name {
                    mom.children.insert(0, key);
                } else {
                    mom.children.push(key);
                }
            }
            if let Some(node) = self.nodes.get_mut(key) {
                node.moms.push(mkey);
            }
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.hostname = hosts[0].clone();
            node.attr_mut(NodeAttr::Mom).set(AttrValue::StrArray(hosts));
            node.attr_mut(NodeAttr::Port).set(AttrValue::Long(i64::from(port)));
        }

        if let Err(e) = self.populate_node(key, attrs, recovering) {
            log::debug!("creation of node {} failed: {}", name, e);
            self.discard_node(key, &created_moms);
            return Err(e);
        }

        self.chng_nodes_file = true;
        if let Some(node) = self.nodes.get_mut(key) {
            node.modified.insert(NodeModified::UPDATE_OTHERS);
        }
        log::debug!("Node {} created", name);
        Ok(key)
    }

    fn populate_node(&mut self, key: NodeKey, attrs: &AttrList, recovering: bool) -> Result<(), PbsError> {
        let resources: Vec<&AttrListEntry> = attrs.iter().filter(|e| e.name == NodeAttr::ResourceAvail.name()).collect();
        if !resources.is_empty() {
            self.set_node_resources(key, resources, ActionMode::New, recovering)?;
        }

        let mode = if recovering { ActionMode::Recov } else { ActionMode::New };
        for entry in attrs.iter() {
            if entry.name == NodeAttr::Mom.name() || entry.name == NodeAttr::Port.name() || entry.name == NodeAttr::ResourceAvail.name() {
                continue;
            }
            let which = match NodeAttr::from_name(&entry.name) {
                Some(which) if entry.resc.is_none() => which,
                _ if recovering => {
                    log::warn!("skipping unknown node attribute {} while recovering", entry.key());
                    continue;
                }
                _ => return Err(PbsError::UnkNodeAttr),
            };

            if recovering && (is_read_only(which) || matches!(which, NodeAttr::State | NodeAttr::Comment)) {
                self.restore_node_attribute(key, which, entry)?;
                continue;
            }
            self.set_node_attribute(key, which, Some(&entry.value), mode)?;
            if entry.flags.contains(AttrFlags::DEFLT) {
                if let Some(node) = self.nodes.get_mut(key) {
                    node.attr_mut(which).flags.insert(AttrFlags::DEFLT);
                }
            }
        }

        let node = self.nodes.get_mut(key).ok_or(PbsError::UnkNode)?;
        let ncpus = node.available_mut().add_entry("ncpus");
        if !ncpus.is_set() {
            ncpus.value = ResourceValue::Long(1);
            ncpus.flags.insert(AttrFlags::SET | AttrFlags::DEFLT | AttrFlags::MODCACHE);
            self.mod_node_ncpus(key, 1, ActionMode::New)?;
        }

        let node = self.nodes.get(key).ok_or(PbsError::UnkNode)?;
        if let (true, Some(pool), Some(&mom)) = (node.is_natural_vnode(), node.attr(NodeAttr::VnodePool).as_long(), node.moms.first()) {
            self.moms.add_to_pool(mom, pool);
        }
        Ok(())
    }

    /// Installs a server-owned attribute from a recovered row without running its action.
    fn restore_node_attribute(&mut self, key: NodeKey, which: NodeAttr, entry: &AttrListEntry) -> Result<(), PbsError> {
        match which {
            NodeAttr::ResourceAssn | NodeAttr::Jobs | NodeAttr::Resvs => return Ok(()),
            NodeAttr::State => {
                let state = NodeState::decode(&entry.value)?;
                let node = self.nodes.get_mut(key).ok_or(PbsError::UnkNode)?;
                node.set_state(state & NodeState::OFFLINE_ANY);
                return Ok(());
            }
            _ => {}
        }

        let value = which.decode(&entry.value)?;
        let node = self.nodes.get_mut(key).ok_or(PbsError::UnkNode)?;
        if let (NodeAttr::MaintJobs, AttrValue::StrArray(jobs)) = (which, &value) {
            if !jobs.is_empty() {
                node.set_state(NodeState::MAINTENANCE);
            }
            self.admin_suspended.extend(jobs.iter().map(|job| JobId::new(job.as_str())));
        }
        node.attr_mut(which).set(value);
        if entry.flags.contains(AttrFlags::DEFLT) {
            node.attr_mut(which).flags.insert(AttrFlags::DEFLT);
        }
        Ok(())
    }

    /// Drops a half-built node and any Mom created for it.
    fn discard_node(&mut self, key: NodeKey, created_moms: &[MomKey]) {
        let Some(node) = self.nodes.remove(key) else {
            return;
        };
        for mkey in &node.moms {
            if let Some(mom) = self.moms.get_mut(*mkey) {
                mom.children.retain(|child| *child != key);
            }
        }
        for mkey in created_moms {
            if self.moms.get(*mkey).is_some_and(|mom| mom.children.is_empty()) {
                self.moms.remove_from_pool(*mkey);
                self.moms.delete_addresses(*mkey);
                self.moms.remove(*mkey);
            }
        }
    }

    /// After an administrative add every live node is marked down and every Mom is asked
    /// to report its addresses again.
    pub fn setup_notification(&mut self) {
        for key in self.nodes.keys() {
            if let Some(node) = self.nodes.get_mut(key) {
                if !node.state.contains(NodeState::DELETED) {
                    node.set_state(NodeState::DOWN);
                }
            }
        }
        for mkey in self.moms.keys() {
            if let Some(mom) = self.moms.get_mut(mkey) {
                mom.state.insert(NodeState::NEED_ADDRS);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_name_suffix_is_stripped() {
        assert_eq!(process_host_name_part("n1:ts"), Ok(("n1".to_string(), NTYPE_PBS)));
        assert_eq!(process_host_name_part(" n2 "), Ok(("n2".to_string(), NTYPE_PBS)));
        assert_eq!(process_host_name_part(":ts"), Err(PbsError::UnkNode));
        assert_eq!(process_host_name_part(""), Err(PbsError::UnkNode));
    }
}
