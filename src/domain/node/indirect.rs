use crate::domain::attribute::flags::AttrFlags;
use crate::domain::attribute::resource::{Resource, ResourceType, ResourceValue};
use crate::domain::node::node::NodeState;
use crate::domain::node::node_store::NodeKey;
use crate::domain::server::server::{Server, ServerState};
use crate::domain::work_task::work_task::WorkTask;
use crate::error::PbsError;

/// The two passes of `fix_indirectness`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndirectPhase {
    /// Check only; nothing is modified.
    Validate,
    /// Apply; only called once every entry of the request validated.
    Commit,
}

fn zero_value(rtype: Option<ResourceType>) -> ResourceValue {
    match rtype {
        Some(ResourceType::Size) => ResourceValue::Size("0kb".to_string()),
        Some(ResourceType::Long) => ResourceValue::Long(0),
        _ => ResourceValue::Unset,
    }
}

impl Server {
    pub fn fix_indirectness(&mut self, resc: &Resource, key: NodeKey, phase: IndirectPhase) -> Result<(), PbsError> {
        match phase {
            IndirectPhase::Validate => self.validate_indirectness(key, resc),
            IndirectPhase::Commit => {
                self.commit_indirectness(key, resc);
                Ok(())
            }
        }
    }

    /// Checks whether `resc`, the new value of a resources_available entry of `key`,
    /// may become (or stop being) an indirect reference.
    pub fn validate_indirectness(&self, key: NodeKey, resc: &Resource) -> Result<(), PbsError> {
        let node = self.nodes.get(key).ok_or(PbsError::UnkNode)?;
        let original = node.available().and_then(|list| list.find(&resc.name));

        if !resc.is_indirect() {
            if original.is_some_and(Resource::is_indirect) && node.has_running_jobs() {
                return Err(PbsError::ObjBusy);
            }
            return Ok(());
        }

        if node.has_running_jobs() {
            return Err(PbsError::ObjBusy);
        }
        if original.is_some_and(Resource::is_target) {
            return Err(PbsError::IndirectHop(resc.name.clone()));
        }

        let target_name = resc.indirect_target().unwrap_or_default();
        let Some(target_key) = self.find_nodebyname(target_name) else {
            return if self.state == ServerState::Init { Ok(()) } else { Err(PbsError::UnkNode) };
        };
        if target_key == key {
            return Err(PbsError::IndirectHop(resc.name.clone()));
        }
        let target = self.nodes.get(target_key).and_then(|n| n.available()).and_then(|list| list.find(&resc.name));
        match target {
            None => Err(PbsError::IndirectBt(resc.name.clone())),
            Some(t) if t.is_indirect() => Err(PbsError::IndirectHop(t.name.clone())),
            Some(_) => Ok(()),
        }
    }

    /// Flips the target flag on the referenced resource and mirrors indirectness onto the paired
    /// resources_assigned entry. When the target cannot be marked now, a full target check is queued.
    pub fn commit_indirectness(&mut self, key: NodeKey, resc: &Resource) {
        let rdef = self.defs.find(&resc.name);
        let consumable = rdef.is_some_and(|d| d.is_consumable());
        let rtype = rdef.map(|d| d.rtype);
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        let original = node.available().and_then(|list| list.find(&resc.name)).cloned();
        let name = node.name.to_string();

        if resc.is_indirect() {
            let target_known = resc.indirect_target().and_then(|t| self.find_nodebyname(t)).is_some();
            if !self.set_clear_target(&name, resc, true) {
                self.tasks.schedule(WorkTask::IndirectTargetCheck);
            }
            if consumable && target_known {
                if let Some(node) = self.nodes.get_mut(key) {
                    let assigned = node.assigned_mut().add_entry(&resc.name);
                    assigned.value = resc.value.clone();
                    assigned.flags.insert(AttrFlags::SET | AttrFlags::INDIRECT | AttrFlags::MODCACHE);
                }
            }
        } else if let Some(old) = original.filter(Resource::is_indirect) {
            self.set_clear_target(&name, &old, false);
            if consumable {
                if let Some(assigned) = self.nodes.get_mut(key).and_then(|n| n.assigned_mut().find_mut(&resc.name)) {
                    assigned.value = zero_value(rtype);
                    assigned.flags.remove(AttrFlags::INDIRECT);
                    assigned.flags.insert(AttrFlags::MODCACHE);
                }
            }
            self.tasks.schedule(WorkTask::IndirectTargetCheck);
        }
    }

    /// Sets or clears the target flag on the resource `source` points at. Returns false,
    /// logging why, when the target vnode or resource does not exist.
    pub fn set_clear_target(&mut self, source_node: &str, source: &Resource, set: bool) -> bool {
        let target_name = source.indirect_target();
        let Some(target_key) = target_name.and_then(|t| self.find_nodebyname(t)) else {
            log::error!(
                "{}: resource {} on vnode points to invalid vnode {}",
                source_node,
                source.name,
                target_name.unwrap_or_default()
            );
            return false;
        };
        let target = self.nodes.get_mut(target_key).and_then(|n| n.available_mut().find_mut(&source.name));
        match target {
            Some(target) => {
                if set {
                    target.flags.insert(AttrFlags::TARGET);
                } else {
                    target.flags.remove(AttrFlags::TARGET);
                }
                true
            }
            None => {
                log::error!(
                    "{}: resource {} on vnode points to missing resource on vnode {}",
                    source_node,
                    source.name,
                    target_name.unwrap_or_default()
                );
                false
            }
        }
    }

    /// Re-asserts the target flag for every indirect resource of every live node.
    pub fn indirect_target_check(&mut self) {
        let mut sources = Vec::new();
        for (_, node) in self.nodes.iter() {
            if node.state.intersects(NodeState::DELETED | NodeState::STALE) {
                continue;
            }
            if let Some(list) = node.available() {
                sources.extend(list.iter().filter(|r| r.is_indirect()).map(|r| (node.name.to_string(), r.clone())));
            }
        }
        for (node_name, resc) in sources {
            self.set_clear_target(&node_name, &resc, true);
        }
    }
}
