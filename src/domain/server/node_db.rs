use crate::domain::attribute::attr_list::AttrList;
use crate::domain::attribute::flags::AttrFlags;
use crate::domain::node::node::{NodeAttr, PbsNode};
use crate::domain::node::node_store::NodeKey;
use crate::domain::persistence::backend::DbOutcome;
use crate::domain::persistence::db_object::{DbMomInfoTime, DbNodeInfo, DbObject, DbObjectType, SaveType};
use crate::domain::server::server::{MomInfoTime, Server};
use crate::error::{DbError, Error, Result};

impl PbsNode {
    /// Saved attributes in store form. Resource lists contribute one entry per set resource.
    pub fn saved_attrs(&self) -> AttrList {
        let mut list = AttrList::new();
        for (which, attr) in self.attrs() {
            if !which.is_saved() {
                continue;
            }
            if which == NodeAttr::ResourceAvail {
                for resc in self.available().into_iter().flat_map(|l| l.iter()).filter(|r| r.is_set()) {
                    list.add(which.name(), Some(&resc.name), resc.value.encode(), resc.flags);
                }
            } else if attr.is_set() {
                list.add(which.name(), None, which.encode(&attr.value), attr.flags);
            }
        }
        list
    }
}

fn state_record(node: &PbsNode) -> (AttrList, AttrList) {
    let mut save = AttrList::new();
    let mut delete = AttrList::new();
    let comment = node.attr(NodeAttr::Comment);
    match comment.as_str() {
        Some(text) if !comment.is_default() => save.add(NodeAttr::Comment.name(), None, text, comment.flags),
        _ => delete.add(NodeAttr::Comment.name(), None, "", AttrFlags::NONE),
    }
    (save, delete)
}

impl Server {
    /// Full store row of a node.
    pub fn node_to_db(&self, key: NodeKey) -> Option<DbNodeInfo> {
        let node = self.nodes.get(key)?;
        let mom_modtime = node.moms.first().and_then(|m| self.moms.get(*m)).map_or(0, |m| m.modtime);
        Some(DbNodeInfo {
            nd_name: node.name.to_string(),
            nd_index: node.arr_index as i64,
            mom_modtime,
            nd_hostname: node.hostname.clone(),
            nd_state: node.state.bits(),
            nd_ntype: node.ntype as i32,
            nd_pque: node.pque.as_ref().map(|q| q.to_string()).unwrap_or_default(),
            db_attr_list: node.saved_attrs(),
            ..Default::default()
        })
    }

    /// Writes the whole node row: an insert for a node never written, a full update otherwise.
    pub fn node_save_db(&mut self, key: NodeKey) -> Result<()> {
        let Some(row) = self.node_to_db(key) else {
            return Ok(());
        };
        let written = self.nodes.get(key).is_some_and(|n| n.written);
        let obj = DbObject::Node(row);

        let outcome = if written { self.conn.save_obj(&obj, SaveType::UpdateFull)? } else { DbOutcome::NotFound };
        if outcome == DbOutcome::NotFound {
            self.conn.save_obj(&obj, SaveType::Insert)?;
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.written = true;
        }
        Ok(())
    }

    pub fn node_delete_db(&mut self, name: &str) -> Result<()> {
        let obj = DbObject::Node(DbNodeInfo { nd_name: name.to_string(), ..Default::default() });
        if self.conn.delete_obj(&obj)? == DbOutcome::NotFound {
            log::debug!("node {} had no row in the datastore", name);
        }
        Ok(())
    }

    /// Row of `name` as stored, `None` when there is none.
    pub fn node_recov_db_raw(&mut self, name: &str) -> Result<Option<DbNodeInfo>> {
        let mut obj = DbObject::Node(DbNodeInfo { nd_name: name.to_string(), ..Default::default() });
        match (self.conn.load_obj(&mut obj)?, obj) {
            (DbOutcome::Found, DbObject::Node(row)) => Ok(Some(row)),
            _ => Ok(None),
        }
    }

    /// Writes the state column and the comment of a node without rewriting its attributes.
    pub fn write_single_node_state(&mut self, key: NodeKey) -> Result<()> {
        let (Some(row), Some(node)) = (self.node_to_db(key), self.nodes.get(key)) else {
            return Ok(());
        };
        let (save, delete) = state_record(node);
        let name = row.nd_name.clone();

        if self.conn.save_obj(&DbObject::Node(row), SaveType::UpdateQuick)? == DbOutcome::NotFound {
            return Err(Error::Db(DbError::Backend(format!("no row for node {} while saving its state", name))));
        }
        if !save.is_empty() {
            self.conn.save_attr_obj(DbObjectType::Node, &name, &save)?;
        }
        if !delete.is_empty() {
            self.conn.delete_attr_obj(DbObjectType::Node, &name, &delete)?;
        }
        Ok(())
    }

    /// Writes only the Mom list of a node.
    pub fn write_single_node_mom_attr(&mut self, key: NodeKey) -> Result<()> {
        let Some(node) = self.nodes.get(key) else {
            return Ok(());
        };
        let attr = node.attr(NodeAttr::Mom);
        let mut list = AttrList::new();
        list.add(NodeAttr::Mom.name(), None, NodeAttr::Mom.encode(&attr.value), attr.flags);
        let name = node.name.to_string();

        if self.conn.save_attr_obj(DbObjectType::Node, &name, &list)? == DbOutcome::NotFound {
            return Err(Error::Db(DbError::Backend(format!("no row for node {} while saving its Mom list", name))));
        }
        Ok(())
    }

    /// Upserts the mom-info generation row: update, then insert if nothing matched.
    pub(crate) fn save_mominfo_time(&mut self) -> Result<()> {
        let obj = DbObject::MomInfoTime(DbMomInfoTime { mit_time: self.mominfo_time.time, mit_gen: self.mominfo_time.generation });
        if self.conn.save_obj(&obj, SaveType::UpdateFull)? == DbOutcome::NotFound {
            self.conn.save_obj(&obj, SaveType::Insert)?;
        }
        Ok(())
    }

    pub(crate) fn load_mominfo_time(&mut self) -> Result<()> {
        let mut obj = DbObject::MomInfoTime(DbMomInfoTime::default());
        if let (DbOutcome::Found, DbObject::MomInfoTime(row)) = (self.conn.load_obj(&mut obj)?, &obj) {
            self.mominfo_time = MomInfoTime { time: row.mit_time, generation: row.mit_gen };
        }
        Ok(())
    }
}
