use crate::domain::attribute::attr_list::AttrList;
use crate::domain::persistence::db_object::{DbObject, DbSchedInfo, SaveType};
use crate::domain::server::server::Server;
use crate::domain::utils::id::SchedName;
use crate::error::Result;

pub const DEFAULT_SCHED_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduler {
    pub name: SchedName,
    /// Partitions this scheduler serves.
    pub partitions: Vec<String>,
    pub attrs: AttrList,
}

impl Scheduler {
    fn to_db(&self) -> DbObject {
        DbObject::Sched(DbSchedInfo { sched_name: self.name.to_string(), db_attr_list: self.attrs.clone(), ..Default::default() })
    }
}

impl Server {
    /// Adds a scheduler with every attribute unset.
    pub fn sched_alloc(&mut self, name: &str) -> &mut Scheduler {
        self.scheds.push(Scheduler { name: SchedName::new(name), partitions: Vec::new(), attrs: AttrList::new() });
        let last = self.scheds.len() - 1;
        &mut self.scheds[last]
    }

    /// `"1"` and `"sched"` name the default scheduler.
    pub fn find_scheduler(&self, name: &str) -> Option<&Scheduler> {
        let name = if name == "1" || name == "sched" { DEFAULT_SCHED_NAME } else { name };
        self.scheds.iter().find(|s| s.name.as_str() == name)
    }

    pub fn sched_save_db(&mut self, name: &str) -> Result<()> {
        let Some(sched) = self.find_scheduler(name) else {
            return Ok(());
        };
        let obj = sched.to_db();
        self.conn.save_obj(&obj, SaveType::Insert)?;
        Ok(())
    }

    /// Removes the scheduler from the store and from memory. A store failure is logged only.
    pub fn sched_delete(&mut self, name: &str) {
        let Some(pos) = self.scheds.iter().position(|s| s.name.as_str() == name) else {
            return;
        };
        let obj = self.scheds[pos].to_db();
        if let Err(e) = self.conn.delete_obj(&obj) {
            log::error!("delete of scheduler {} from datastore failed: {}", name, e);
        }
        self.scheds.remove(pos);
    }
}
