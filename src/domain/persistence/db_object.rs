use serde::{Deserialize, Serialize};

use crate::domain::attribute::attr_list::AttrList;

/// Discriminator of the persisted object kinds, in store order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DbObjectType {
    Svr = 0,
    Sched = 1,
    Queue = 2,
    Node = 3,
    MomInfoTime = 4,
    Job = 5,
    JobScr = 6,
    Resv = 7,
}

impl DbObjectType {
    pub const ALL: [DbObjectType; 8] = [
        DbObjectType::Svr,
        DbObjectType::Sched,
        DbObjectType::Queue,
        DbObjectType::Node,
        DbObjectType::MomInfoTime,
        DbObjectType::Job,
        DbObjectType::JobScr,
        DbObjectType::Resv,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveType {
    /// New row, full object.
    Insert,
    /// Replace the row and every attribute.
    UpdateFull,
    /// Replace only the scalar (non-attribute) columns.
    UpdateQuick,
}

/// Cursor result ordered by `nd_index` instead of creation order (nodes only).
pub const QUERY_ORDER_BY_INDEX: u32 = 0x01;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub flags: u32,
    /// Only rows saved at or after this time.
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbServerInfo {
    pub sv_jobidnumber: i64,
    pub sv_svraddr: i64,
    pub sv_svrport: i32,
    pub db_attr_list: AttrList,
    #[serde(skip)]
    pub cache_attr_list: AttrList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSchedInfo {
    pub sched_name: String,
    pub db_attr_list: AttrList,
    #[serde(skip)]
    pub cache_attr_list: AttrList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbQueueInfo {
    pub qu_name: String,
    pub qu_type: i32,
    pub db_attr_list: AttrList,
    #[serde(skip)]
    pub cache_attr_list: AttrList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbNodeInfo {
    pub nd_name: String,
    pub nd_index: i64,
    pub mom_modtime: i64,
    pub nd_hostname: String,
    pub nd_state: u64,
    pub nd_ntype: i32,
    pub nd_pque: String,
    pub creattm: i64,
    pub savetm: i64,
    pub db_attr_list: AttrList,
    #[serde(skip)]
    pub cache_attr_list: AttrList,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbMomInfoTime {
    pub mit_time: i64,
    pub mit_gen: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbJobInfo {
    pub ji_jobid: String,
    pub ji_state: i32,
    pub ji_substate: i32,
    pub ji_svrflags: i32,
    pub ji_queue: String,
    pub ji_destin: String,
    pub ji_stime: i64,
    pub db_attr_list: AttrList,
    #[serde(skip)]
    pub cache_attr_list: AttrList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbJobScriptInfo {
    pub ji_jobid: String,
    pub script: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbResvInfo {
    pub ri_resvid: String,
    pub ri_queue: String,
    pub ri_state: i32,
    pub ri_substate: i32,
    pub ri_stime: i64,
    pub ri_etime: i64,
    pub ri_duration: i64,
    pub db_attr_list: AttrList,
    #[serde(skip)]
    pub cache_attr_list: AttrList,
}

/// The single parameter shape of every persistence operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbObject {
    Server(DbServerInfo),
    Sched(DbSchedInfo),
    Queue(DbQueueInfo),
    Node(DbNodeInfo),
    MomInfoTime(DbMomInfoTime),
    Job(DbJobInfo),
    JobScr(DbJobScriptInfo),
    Resv(DbResvInfo),
}

const SERVER_KEY: &str = "1";
const MOMINFO_TIME_KEY: &str = "mominfo_time";

impl DbObject {
    pub fn obj_type(&self) -> DbObjectType {
        match self {
            DbObject::Server(_) => DbObjectType::Svr,
            DbObject::Sched(_) => DbObjectType::Sched,
            DbObject::Queue(_) => DbObjectType::Queue,
            DbObject::Node(_) => DbObjectType::Node,
            DbObject::MomInfoTime(_) => DbObjectType::MomInfoTime,
            DbObject::Job(_) => DbObjectType::Job,
            DbObject::JobScr(_) => DbObjectType::JobScr,
            DbObject::Resv(_) => DbObjectType::Resv,
        }
    }

    /// Primary key of the row. Singletons use a fixed key.
    pub fn key(&self) -> &str {
        match self {
            DbObject::Server(_) => SERVER_KEY,
            DbObject::Sched(s) => &s.sched_name,
            DbObject::Queue(q) => &q.qu_name,
            DbObject::Node(n) => &n.nd_name,
            DbObject::MomInfoTime(_) => MOMINFO_TIME_KEY,
            DbObject::Job(j) => &j.ji_jobid,
            DbObject::JobScr(j) => &j.ji_jobid,
            DbObject::Resv(r) => &r.ri_resvid,
        }
    }

    pub fn db_attrs(&self) -> Option<&AttrList> {
        match self {
            DbObject::Server(o) => Some(&o.db_attr_list),
            DbObject::Sched(o) => Some(&o.db_attr_list),
            DbObject::Queue(o) => Some(&o.db_attr_list),
            DbObject::Node(o) => Some(&o.db_attr_list),
            DbObject::Job(o) => Some(&o.db_attr_list),
            DbObject::Resv(o) => Some(&o.db_attr_list),
            DbObject::MomInfoTime(_) | DbObject::JobScr(_) => None,
        }
    }

    pub fn db_attrs_mut(&mut self) -> Option<&mut AttrList> {
        match self {
            DbObject::Server(o) => Some(&mut o.db_attr_list),
            DbObject::Sched(o) => Some(&mut o.db_attr_list),
            DbObject::Queue(o) => Some(&mut o.db_attr_list),
            DbObject::Node(o) => Some(&mut o.db_attr_list),
            DbObject::Job(o) => Some(&mut o.db_attr_list),
            DbObject::Resv(o) => Some(&mut o.db_attr_list),
            DbObject::MomInfoTime(_) | DbObject::JobScr(_) => None,
        }
    }

    pub fn cache_attrs(&self) -> Option<&AttrList> {
        match self {
            DbObject::Server(o) => Some(&o.cache_attr_list),
            DbObject::Sched(o) => Some(&o.cache_attr_list),
            DbObject::Queue(o) => Some(&o.cache_attr_list),
            DbObject::Node(o) => Some(&o.cache_attr_list),
            DbObject::Job(o) => Some(&o.cache_attr_list),
            DbObject::Resv(o) => Some(&o.cache_attr_list),
            DbObject::MomInfoTime(_) | DbObject::JobScr(_) => None,
        }
    }

    pub fn cache_attrs_mut(&mut self) -> Option<&mut AttrList> {
        match self {
            DbObject::Server(o) => Some(&mut o.cache_attr_list),
            DbObject::Sched(o) => Some(&mut o.cache_attr_list),
            DbObject::Queue(o) => Some(&mut o.cache_attr_list),
            DbObject::Node(o) => Some(&mut o.cache_attr_list),
            DbObject::Job(o) => Some(&mut o.cache_attr_list),
            DbObject::Resv(o) => Some(&mut o.cache_attr_list),
            DbObject::MomInfoTime(_) | DbObject::JobScr(_) => None,
        }
    }
}
