use crate::domain::attribute::attr_list::AttrListEntry;
use crate::domain::attribute::flags::AttrFlags;
use crate::domain::attribute::resource::{ResourceList, ResourceValue};
use crate::domain::attribute::value::AttrValue;
use crate::domain::node::node::{NodeAttr, NodeModified, NodeState};
use crate::domain::node::node_store::NodeKey;
use crate::domain::queue::queue::QueueType;
use crate::domain::server::server::Server;
use crate::domain::utils::id::QueueName;
use crate::error::PbsError;

/// Context an attribute action routine runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionMode {
    Noop,
    /// The node is being created.
    New,
    Alter,
    /// Recovering from the store.
    Recov,
    /// The attribute is being unset.
    Free,
}

/// Attributes only the server itself sets.
pub(crate) fn is_read_only(attr: NodeAttr) -> bool {
    matches!(attr, NodeAttr::Jobs | NodeAttr::Resvs | NodeAttr::ResourceAssn | NodeAttr::License | NodeAttr::LicenseInfo | NodeAttr::MaintJobs)
}

fn short_host(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}

pub fn set_node_host_name(mode: ActionMode) -> Result<(), PbsError> {
    if mode == ActionMode::New { Ok(()) } else { Err(PbsError::AttrRo) }
}

pub fn set_node_mom_port(mode: ActionMode) -> Result<(), PbsError> {
    if mode == ActionMode::New { Ok(()) } else { Err(PbsError::AttrRo) }
}

/// Validates a vnode pool id. Pools are fixed once a node exists.
pub fn chk_vnode_pool(pool: i64, mode: ActionMode) -> Result<(), PbsError> {
    match mode {
        ActionMode::New | ActionMode::Recov => {
            log::debug!("vnode_pool value is = {}", pool);
            if pool <= 0 {
                log::warn!("invalid vnode_pool provided");
                return Err(PbsError::BadAtVal);
            }
            Ok(())
        }
        ActionMode::Alter => {
            log::debug!("Unsupported actions for vnode_pool");
            Err(PbsError::IvalReq)
        }
        _ => Err(PbsError::Internal),
    }
}

impl Server {
    /// Resolves a comma separated list of Mom hosts. Empty entries are dropped.
    pub fn decode_mom_list(&mut self, text: &str) -> Vec<String> {
        let hosts: Vec<&str> = text.split(',').map(str::trim).filter(|h| !h.is_empty()).collect();
        let mut resolved = Vec::with_capacity(hosts.len());
        for host in hosts {
            let fqdn = self.resolve_mom_host(host);
            if !resolved.contains(&fqdn) {
                resolved.push(fqdn);
            }
        }
        resolved
    }

    pub fn mark_which_queues_have_nodes(&mut self) {
        for queue in self.queues.values_mut() {
            queue.has_nodes = false;
        }
        self.que_has_nodes = false;

        let used: Vec<QueueName> = self.nodes.iter().filter_map(|(_, node)| node.pque.clone()).collect();
        for name in used {
            if let Some(queue) = self.queues.get_mut(&name) {
                queue.has_nodes = true;
                self.que_has_nodes = true;
            }
        }
    }

    /// Associates the node with an execution queue, or dissociates it when `queue` is `None`.
    pub fn node_queue_action(&mut self, key: NodeKey, queue: Option<&str>) -> Result<(), PbsError> {
        let node = self.nodes.get(key).ok_or(PbsError::UnkNode)?;
        let pque = match queue {
            Some(name) => {
                let q = self.queues.get(&QueueName::new(name)).ok_or(PbsError::UnkQue)?;
                if q.qtype != QueueType::Execution {
                    return Err(PbsError::AttrType);
                }
                if let (Some(qpart), Some(npart)) = (q.partition.as_deref(), node.attr(NodeAttr::Partition).as_str()) {
                    if qpart != npart {
                        return Err(PbsError::PartitionNotInQue);
                    }
                }
                Some(q.name.clone())
            }
            None => None,
        };

        if let Some(node) = self.nodes.get_mut(key) {
            node.pque = pque;
        }
        self.mark_which_queues_have_nodes();
        Ok(())
    }

    /// A node tied to a queue must share that queue's partition.
    pub fn action_node_partition(&self, key: NodeKey, partition: Option<&str>) -> Result<(), PbsError> {
        let node = self.nodes.get(key).ok_or(PbsError::UnkNode)?;
        let Some(qname) = node.attr(NodeAttr::Queue).as_str() else {
            return Ok(());
        };
        let queue = self.queues.get(&QueueName::new(qname)).ok_or(PbsError::UnkQue)?;
        match (queue.partition.as_deref(), partition) {
            (Some(qpart), Some(part)) if qpart != part => Err(PbsError::QueNotInPartition),
            _ => Ok(()),
        }
    }

    /// Records the physical cpu count. `ncpus` follows it while unset or still a default.
    pub fn node_pcpu_action(&mut self, key: NodeKey, pcpus: i64, mode: ActionMode) -> Result<(), PbsError> {
        let node = self.nodes.get_mut(key).ok_or(PbsError::UnkNode)?;
        node.ncpus = pcpus;

        let Some(ncpus) = node.available_mut().find_mut("ncpus") else {
            return Ok(());
        };
        if ncpus.is_set() && !ncpus.flags.contains(AttrFlags::DEFLT) {
            return Ok(());
        }
        if ncpus.value.as_long() == Some(pcpus) {
            return Ok(());
        }
        ncpus.value = ResourceValue::Long(pcpus);
        ncpus.flags.insert(AttrFlags::SET | AttrFlags::MODCACHE | AttrFlags::DEFLT);
        self.mod_node_ncpus(key, pcpus, mode).map(|_| ())
    }

    /// Action routine of resources_available. Every check runs before anything is changed:
    /// read-only and provisioning rules, the ncpus value, then indirectness of each modified
    /// entry. Only then are subnodes reconciled, indirect targets committed and `new` installed.
    pub fn node_np_action(&mut self, key: NodeKey, mut new: ResourceList, mode: ActionMode) -> Result<(), PbsError> {
        if mode == ActionMode::Free {
            return Err(PbsError::IvalReq);
        }
        let node = self.nodes.get(key).ok_or(PbsError::UnkNode)?;

        for fixed in ["host", "vnode"] {
            if new.find(fixed).is_some_and(|r| r.is_modified()) && mode != ActionMode::New {
                return Err(PbsError::AttrRo);
            }
        }
        if new.find("aoe").is_some_and(|r| r.is_modified()) {
            if node.state.intersects(NodeState::PROV | NodeState::WAIT_PROV) {
                return Err(PbsError::NodeProvNoAction);
            }
            let first_mom = node.attr(NodeAttr::Mom).as_str_array().first();
            if first_mom.is_some_and(|mom| short_host(mom).eq_ignore_ascii_case(short_host(&self.name))) {
                return Err(PbsError::ProvHeadError);
            }
        }

        let ncpus = new.find("ncpus").ok_or(PbsError::System)?;
        let new_np = match (ncpus.is_modified(), ncpus.is_indirect(), ncpus.value.as_long()) {
            (true, false, Some(np)) if np < 0 => return Err(PbsError::BadAtVal),
            (true, false, Some(np)) => Some(np),
            (true, false, None) => return Err(PbsError::BadAtVal),
            // The target owns the count; this node keeps a single slot.
            (true, true, _) => Some(0),
            _ => None,
        };

        for resc in new.iter().filter(|r| r.is_modified()) {
            self.validate_indirectness(key, resc)?;
        }

        if let Some(np) = new_np {
            if let Some(entry) = new.find_mut("ncpus") {
                entry.flags.remove(AttrFlags::DEFLT);
            }
            self.mod_node_ncpus(key, np, mode)?;
        }
        for resc in new.iter().filter(|r| r.is_modified()) {
            self.commit_indirectness(key, resc);
        }

        if let Some(node) = self.nodes.get_mut(key) {
            node.attr_mut(NodeAttr::ResourceAvail).set(AttrValue::Resources(new));
        }
        Ok(())
    }

    /// Applies `name.resource=value` entries to resources_available as one request.
    /// Unknown resources fail with `UnkResc` unless `allow_unknown` is set, in which case they are skipped.
    pub fn set_node_resources<'a>(
        &mut self,
        key: NodeKey,
        entries: impl IntoIterator<Item = &'a AttrListEntry>,
        mode: ActionMode,
        allow_unknown: bool,
    ) -> Result<(), PbsError> {
        let node = self.nodes.get(key).ok_or(PbsError::UnkNode)?;
        let mut candidate = node.available().cloned().unwrap_or_default();
        candidate.clear_modify();

        for entry in entries {
            let Some(resc) = entry.resc.as_deref() else {
                return Err(PbsError::UnkResc);
            };
            let Some(def) = self.defs.find(resc) else {
                if allow_unknown {
                    log::warn!("Node {}: skipping unknown resource {}", node.name, resc);
                    continue;
                }
                return Err(PbsError::UnkResc);
            };
            let value = ResourceValue::decode(def.rtype, &entry.value)?;
            let slot = candidate.add_entry(resc);
            slot.set_value(value);
            if entry.flags.contains(AttrFlags::DEFLT) {
                slot.flags.insert(AttrFlags::DEFLT);
            }
        }

        self.node_np_action(key, candidate, mode)
    }

    /// Administrative set (`value` present) or unset (`None`) of one node attribute.
    /// Runs the attribute's action routine, then installs the value and marks it modified.
    pub fn set_node_attribute(&mut self, key: NodeKey, which: NodeAttr, value: Option<&str>, mode: ActionMode) -> Result<(), PbsError> {
        if self.nodes.get(key).is_none() {
            return Err(PbsError::UnkNode);
        }
        if matches!(which, NodeAttr::ResourceAvail) {
            return match value {
                Some(_) => Err(PbsError::AttrType),
                None => Err(PbsError::IvalReq),
            };
        }
        if is_read_only(which) && mode != ActionMode::Recov {
            return Err(PbsError::AttrRo);
        }

        let Some(text) = value else {
            return self.unset_node_attribute(key, which);
        };

        let decoded = match which {
            NodeAttr::Mom => {
                set_node_host_name(mode)?;
                AttrValue::StrArray(self.decode_mom_list(text))
            }
            NodeAttr::Port => {
                set_node_mom_port(mode)?;
                which.decode(text)?
            }
            NodeAttr::Pcpus => {
                let decoded = which.decode(text)?;
                let pcpus = match decoded {
                    AttrValue::Long(v) => v,
                    _ => return Err(PbsError::BadAtVal),
                };
                self.node_pcpu_action(key, pcpus, mode)?;
                decoded
            }
            NodeAttr::Queue => {
                self.node_queue_action(key, Some(text.trim()))?;
                AttrValue::Str(text.trim().to_string())
            }
            NodeAttr::Partition => {
                self.action_node_partition(key, Some(text.trim()))?;
                AttrValue::Str(text.trim().to_string())
            }
            NodeAttr::VnodePool => {
                let decoded = which.decode(text)?;
                if let AttrValue::Long(pool) = decoded {
                    chk_vnode_pool(pool, mode)?;
                }
                decoded
            }
            NodeAttr::TopologyInfo => {
                self.set_node_topology(key, text, mode)?;
                AttrValue::Str(text.to_string())
            }
            NodeAttr::State => {
                let wanted = NodeState::decode(text)?;
                let node = self.nodes.get_mut(key).ok_or(PbsError::UnkNode)?;
                if wanted.contains(NodeState::OFFLINE) {
                    node.set_state(NodeState::OFFLINE);
                } else {
                    node.clear_state(NodeState::OFFLINE);
                }
                return Ok(());
            }
            _ => which.decode(text)?,
        };

        let node = self.nodes.get_mut(key).ok_or(PbsError::UnkNode)?;
        node.attr_mut(which).set(decoded);
        if which == NodeAttr::Mom {
            node.modified.insert(NodeModified::UPDATE_MOM);
        }
        Ok(())
    }

    fn unset_node_attribute(&mut self, key: NodeKey, which: NodeAttr) -> Result<(), PbsError> {
        match which {
            NodeAttr::Mom => set_node_host_name(ActionMode::Free)?,
            NodeAttr::Port => set_node_mom_port(ActionMode::Free)?,
            NodeAttr::VnodePool => chk_vnode_pool(0, ActionMode::Alter)?,
            NodeAttr::State => return Err(PbsError::IvalReq),
            NodeAttr::Queue => self.node_queue_action(key, None)?,
            NodeAttr::Partition => self.action_node_partition(key, None)?,
            _ => {}
        }
        let node = self.nodes.get_mut(key).ok_or(PbsError::UnkNode)?;
        node.attr_mut(which).clear();
        Ok(())
    }
}
