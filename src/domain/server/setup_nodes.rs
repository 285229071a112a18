use std::path::Path;

use crate::domain::attribute::attr_list::AttrList;
use crate::domain::attribute::flags::AttrFlags;
use crate::domain::attribute::resource::{ResourceDef, ResourceDefFlags, ResourceType};
use crate::domain::attribute::value::AttrValue;
use crate::domain::mom::mom_store::MomStore;
use crate::domain::node::node::{LICENSED_LOCKED, NodeAttr, NodeModified, NodeState};
use crate::domain::node::node_store::NodeStore;
use crate::domain::persistence::connection::TrxEnd;
use crate::domain::persistence::db_object::{DbNodeInfo, DbObject, DbObjectType, QUERY_ORDER_BY_INDEX, QueryOptions};
use crate::domain::server::server::{MomInfoTime, Server};
use crate::domain::work_task::work_task::WorkTask;
use crate::error::{NodesFileError, Result};
use crate::loader::nodes_file::{NodesFile, read_node_state_file, read_nodes_file};

impl Server {
    /// Rebuilds the node table from the store.
    ///
    /// Rows are read in array order inside one transaction. A row that cannot be turned back
    /// into a node is logged and skipped. Every node comes back clean (no pending changes).
    ///
    /// # Returns
    /// The number of nodes recovered.
    pub fn setup_nodes(&mut self) -> Result<usize> {
        self.nodes = NodeStore::new();
        self.moms = MomStore::new();

        self.conn.begin_trx(0, false)?;
        let recovered = match self.recover_node_rows() {
            Ok(count) => count,
            Err(e) => {
                if let Err(rb) = self.conn.end_trx(TrxEnd::Rollback) {
                    log::error!("rollback after failed node recovery: {}", rb);
                }
                return Err(e);
            }
        };
        self.conn.end_trx(TrxEnd::Commit)?;

        for key in self.nodes.keys() {
            if let Some(node) = self.nodes.get_mut(key) {
                node.clear_modify_flags();
                node.modified = NodeModified::EMPTY;
            }
        }
        self.chng_nodes_file = false;
        self.reclaim_node_licenses();
        self.license_more_nodes();
        self.mark_which_queues_have_nodes();
        self.tasks.schedule(WorkTask::IndirectTargetCheck);
        log::info!("Recovered {} node(s) from the datastore", recovered);
        Ok(recovered)
    }

    fn recover_node_rows(&mut self) -> Result<usize> {
        self.load_mominfo_time()?;

        let opts = QueryOptions { flags: QUERY_ORDER_BY_INDEX, timestamp: None };
        let mut cursor = self.conn.cursor_init(DbObjectType::Node, Some(&opts))?;
        let mut recovered = 0;
        loop {
            let row = match self.conn.cursor_next(&mut cursor) {
                Ok(Some(DbObject::Node(row))) => row,
                Ok(Some(other)) => {
                    log::warn!("unexpected {:?} row in node cursor", other.obj_type());
                    continue;
                }
                Ok(None) => break,
                Err(e) => {
                    self.conn.cursor_close(cursor);
                    return Err(e.into());
                }
            };
            if self.recover_node(&row) {
                recovered += 1;
            }
        }
        self.conn.cursor_close(cursor);
        Ok(recovered)
    }

    fn recover_node(&mut self, row: &DbNodeInfo) -> bool {
        let key = match self.create_pbs_node(&row.nd_name, &row.db_attr_list, true) {
            Ok(key) => key,
            Err(e) => {
                log::error!("could not recover node {}: {}", row.nd_name, e);
                return false;
            }
        };
        let Some(node) = self.nodes.get_mut(key) else {
            return false;
        };
        node.written = true;
        let saved_state = NodeState::from_bits(row.nd_state) & NodeState::OFFLINE_ANY;
        if !saved_state.is_empty() {
            node.set_state(saved_state);
        }
        for mkey in node.moms.clone() {
            if let Some(mom) = self.moms.get_mut(mkey) {
                mom.modtime = mom.modtime.max(row.mom_modtime);
            }
        }
        true
    }

    /// Takes back from the pool the licenses recovered nodes still hold. A node the pool can no
    /// longer cover loses its lock and waits for `license_more_nodes`.
    fn reclaim_node_licenses(&mut self) {
        for key in self.nodes.keys() {
            let Some(node) = self.nodes.get_mut(key) else {
                continue;
            };
            if node.attr(NodeAttr::License).as_char() != Some(LICENSED_LOCKED) {
                continue;
            }
            let held = node.attr(NodeAttr::LicenseInfo).as_long().unwrap_or(0);
            if held > 0 && self.licenses.consume(held) {
                continue;
            }
            log::warn!("node {}: {} recovered license(s) no longer available", node.name, held);
            node.attr_mut(NodeAttr::License).clear();
            node.modified.insert(NodeModified::UPDATE_OTHERS);
        }
    }

    /// Legacy properties become boolean resources. A property whose name is already a
    /// resource of another type is an error.
    fn define_legacy_properties(&mut self, file: &NodesFile) -> Result<()> {
        for entry in &file.entries {
            for prop in &entry.properties {
                match self.defs.find(prop) {
                    Some(def) if def.rtype == ResourceType::Boolean => {}
                    Some(_) => return Err(NodesFileError::PropertyNotBoolean { line: entry.line, name: prop.clone() }.into()),
                    None => {
                        let flags = ResourceDefFlags { host_level: true, ..Default::default() };
                        self.defs.add(ResourceDef::new(prop.clone(), ResourceType::Boolean, flags));
                        log::info!("defined boolean resource {} for legacy node property", prop);
                    }
                }
            }
        }
        Ok(())
    }

    /// Builds the node table from the legacy `nodes` and `node_state` files. The nodes keep
    /// their pending changes so that a following `save_nodes_db` writes all of them.
    ///
    /// # Returns
    /// The number of nodes created.
    pub fn setup_nodes_fs(&mut self, nodes_path: &Path, state_path: &Path) -> Result<usize> {
        let file = read_nodes_file(nodes_path)?;
        self.define_legacy_properties(&file)?;
        if let Some((time, generation)) = file.modtime {
            self.mominfo_time = MomInfoTime { time, generation };
        }

        for entry in &file.entries {
            let mut attrs = AttrList::new();
            for attr in &entry.attrs {
                attrs.add(&attr.name, attr.resc.as_deref(), attr.value.clone(), AttrFlags::SET);
            }
            for prop in &entry.properties {
                attrs.add(NodeAttr::ResourceAvail.name(), Some(prop), "True", AttrFlags::SET);
            }
            if let Some(sharing) = entry.sharing {
                attrs.add(NodeAttr::Sharing.name(), None, sharing.name(), AttrFlags::SET);
            }

            let key = self.create_pbs_node(&entry.name, &attrs, true).map_err(|e| {
                log::error!("nodes file line {}: cannot create node {}: {}", entry.line, entry.name, e);
                e
            })?;
            if let Some(ts) = entry.mom_modtime {
                let moms = self.nodes.get(key).map(|n| n.moms.clone()).unwrap_or_default();
                for mkey in moms {
                    if let Some(mom) = self.moms.get_mut(mkey) {
                        mom.modtime = ts;
                    }
                }
            }
        }

        if state_path.exists() {
            for record in read_node_state_file(state_path)? {
                let Some(node) = self.find_nodebyname(&record.name).and_then(|key| self.nodes.get_mut(key)) else {
                    log::warn!("node_state names unknown node {}", record.name);
                    continue;
                };
                let state = NodeState::from_bits(record.state) & (NodeState::OFFLINE | NodeState::OFFLINE_BY_MOM);
                if !state.is_empty() {
                    node.set_state(state);
                }
                if let Some(comment) = record.comment {
                    node.attr_mut(NodeAttr::Comment).set(AttrValue::Str(comment));
                }
            }
        }

        self.chng_nodes_file = true;
        self.mark_which_queues_have_nodes();
        self.tasks.schedule(WorkTask::IndirectTargetCheck);
        log::info!("Read {} node(s) from {}", file.entries.len(), nodes_path.display());
        Ok(file.entries.len())
    }
}
