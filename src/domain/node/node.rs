use crate::domain::attribute::flags::AttrFlags;
use crate::domain::attribute::resource::{ResourceDefs, ResourceList, ResourceType, ResourceValue};
use crate::domain::attribute::value::{AttrValue, Attribute};
use crate::domain::mom::mom_store::MomKey;
use crate::domain::utils::bits::bit_set;
use crate::domain::utils::id::{JobId, NodeName, QueueName};
use crate::error::PbsError;

bit_set! {
    /// Node (and subnode) usage state.
    pub struct NodeState(u64) {
        const FREE = 0x0000;
        const OFFLINE = 0x0001;
        const DOWN = 0x0002;
        const DELETED = 0x0004;
        const UNKNOWN = 0x0008;
        const JOB = 0x0010;
        const STALE = 0x0020;
        const MAINTENANCE = 0x0040;
        const OFFLINE_BY_MOM = 0x0080;
        const SLEEP = 0x0100;
        const PROV = 0x0200;
        const WAIT_PROV = 0x0400;
        const NEED_ADDRS = 0x0800;
    }
}

/// Names used when the state is shown or written as text.
const STATE_NAMES: [(NodeState, &str); 12] = [
    (NodeState::OFFLINE, "offline"),
    (NodeState::DOWN, "down"),
    (NodeState::DELETED, "deleted"),
    (NodeState::UNKNOWN, "state-unknown"),
    (NodeState::JOB, "job-busy"),
    (NodeState::STALE, "Stale"),
    (NodeState::MAINTENANCE, "maintenance"),
    (NodeState::OFFLINE_BY_MOM, "offline_by_mom"),
    (NodeState::SLEEP, "sleep"),
    (NodeState::PROV, "provisioning"),
    (NodeState::WAIT_PROV, "wait-provisioning"),
    (NodeState::NEED_ADDRS, "need-addrs"),
];

impl NodeState {
    /// States under which the node is considered offline for state-record purposes.
    pub const OFFLINE_ANY: NodeState = NodeState::from_bits(0x0001 | 0x0080 | 0x0100);

    pub fn encode(self) -> String {
        let names: Vec<&str> = STATE_NAMES.iter().filter(|(flag, _)| self.contains(*flag)).map(|(_, name)| *name).collect();
        if names.is_empty() { "free".to_string() } else { names.join(",") }
    }

    pub fn decode(text: &str) -> Result<NodeState, PbsError> {
        let mut state = NodeState::FREE;
        for word in text.split(',').map(str::trim).filter(|w| !w.is_empty()) {
            if word == "free" {
                continue;
            }
            let (flag, _) = STATE_NAMES.iter().find(|(_, name)| name.eq_ignore_ascii_case(word)).ok_or(PbsError::BadAtVal)?;
            state.insert(*flag);
        }
        Ok(state)
    }
}

bit_set! {
    /// Categories of change pending persistence.
    pub struct NodeModified(u8) {
        const UPDATE_STATE = 0x01;
        const UPDATE_COMMENT = 0x02;
        const UPDATE_OTHERS = 0x04;
        const UPDATE_MOM = 0x08;
    }
}

/// Attribute slots of a node, in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeAttr {
    Mom,
    Port,
    Version,
    NType,
    State,
    Pcpus,
    Jobs,
    Resvs,
    ResvEnable,
    Queue,
    ResourceAvail,
    ResourceAssn,
    Comment,
    Sharing,
    License,
    LicenseInfo,
    TopologyInfo,
    VnodePool,
    MaintJobs,
    Partition,
}

impl NodeAttr {
    pub const COUNT: usize = 20;

    pub const ALL: [NodeAttr; NodeAttr::COUNT] = [
        NodeAttr::Mom,
        NodeAttr::Port,
        NodeAttr::Version,
        NodeAttr::NType,
        NodeAttr::State,
        NodeAttr::Pcpus,
        NodeAttr::Jobs,
        NodeAttr::Resvs,
        NodeAttr::ResvEnable,
        NodeAttr::Queue,
        NodeAttr::ResourceAvail,
        NodeAttr::ResourceAssn,
        NodeAttr::Comment,
        NodeAttr::Sharing,
        NodeAttr::License,
        NodeAttr::LicenseInfo,
        NodeAttr::TopologyInfo,
        NodeAttr::VnodePool,
        NodeAttr::MaintJobs,
        NodeAttr::Partition,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeAttr::Mom => "Mom",
            NodeAttr::Port => "Port",
            NodeAttr::Version => "pbs_version",
            NodeAttr::NType => "ntype",
            NodeAttr::State => "state",
            NodeAttr::Pcpus => "pcpus",
            NodeAttr::Jobs => "jobs",
            NodeAttr::Resvs => "resv",
            NodeAttr::ResvEnable => "resv_enable",
            NodeAttr::Queue => "queue",
            NodeAttr::ResourceAvail => "resources_available",
            NodeAttr::ResourceAssn => "resources_assigned",
            NodeAttr::Comment => "comment",
            NodeAttr::Sharing => "sharing",
            NodeAttr::License => "license",
            NodeAttr::LicenseInfo => "license_info",
            NodeAttr::TopologyInfo => "topology_info",
            NodeAttr::VnodePool => "vnode_pool",
            NodeAttr::MaintJobs => "maintenance_jobs",
            NodeAttr::Partition => "partition",
        }
    }

    pub fn from_name(name: &str) -> Option<NodeAttr> {
        NodeAttr::ALL.iter().copied().find(|attr| attr.name().eq_ignore_ascii_case(name))
    }

    /// Whether the slot is part of the node's full store row. State lives in its own column,
    /// the comment travels in the separate state record, the rest is runtime only.
    pub fn is_saved(self) -> bool {
        !matches!(
            self,
            NodeAttr::State | NodeAttr::Comment | NodeAttr::Jobs | NodeAttr::Resvs | NodeAttr::ResourceAssn | NodeAttr::TopologyInfo
        )
    }

    /// Decodes the text form of a non-resource attribute.
    pub fn decode(self, text: &str) -> Result<AttrValue, PbsError> {
        let long = |t: &str| t.trim().parse::<i64>().map_err(|_| PbsError::BadAtVal);
        match self {
            NodeAttr::Mom | NodeAttr::Jobs | NodeAttr::Resvs | NodeAttr::MaintJobs => {
                Ok(AttrValue::StrArray(text.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()))
            }
            NodeAttr::Port | NodeAttr::Pcpus | NodeAttr::LicenseInfo | NodeAttr::VnodePool => long(text).map(AttrValue::Long),
            NodeAttr::NType => match text.trim() {
                "PBS" => Ok(AttrValue::Long(NTYPE_PBS)),
                other => long(other).map(AttrValue::Long),
            },
            NodeAttr::State => NodeState::decode(text).map(|s| AttrValue::Long(s.bits() as i64)),
            NodeAttr::ResvEnable => match ResourceValue::decode(ResourceType::Boolean, text)? {
                ResourceValue::Bool(b) => Ok(AttrValue::Bool(b)),
                _ => Err(PbsError::BadAtVal),
            },
            NodeAttr::Sharing => VnodeSharing::from_name(text.trim()).map(|s| AttrValue::Long(s as i64)).ok_or(PbsError::BadAtVal),
            NodeAttr::License => text.trim().chars().next().map(AttrValue::Char).ok_or(PbsError::BadAtVal),
            NodeAttr::Version | NodeAttr::Queue | NodeAttr::Comment | NodeAttr::TopologyInfo | NodeAttr::Partition => {
                Ok(AttrValue::Str(text.to_string()))
            }
            NodeAttr::ResourceAvail | NodeAttr::ResourceAssn => Err(PbsError::AttrType),
        }
    }

    /// Text form of a non-resource attribute value.
    pub fn encode(self, value: &AttrValue) -> String {
        match (self, value) {
            (NodeAttr::State, AttrValue::Long(v)) => NodeState::from_bits(*v as u64).encode(),
            (NodeAttr::NType, AttrValue::Long(NTYPE_PBS)) => "PBS".to_string(),
            (NodeAttr::Sharing, AttrValue::Long(v)) => VnodeSharing::from_index(*v).map_or_else(|| v.to_string(), |s| s.name().to_string()),
            (_, AttrValue::Unset) | (_, AttrValue::Resources(_)) => String::new(),
            (_, AttrValue::Long(v)) => v.to_string(),
            (_, AttrValue::Bool(true)) => "True".to_string(),
            (_, AttrValue::Bool(false)) => "False".to_string(),
            (_, AttrValue::Char(c)) => c.to_string(),
            (_, AttrValue::Str(s)) => s.clone(),
            (_, AttrValue::StrArray(v)) => v.join(","),
        }
    }
}

pub const NTYPE_PBS: i64 = 0;

/// License attribute value of a node holding licenses.
pub const LICENSED_LOCKED: char = 'l';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnodeSharing {
    DefaultShared = 0,
    DefaultExcl = 1,
    DefaultExclhost = 2,
    IgnoreExcl = 3,
    ForceExcl = 4,
    ForceExclhost = 5,
}

impl VnodeSharing {
    const ALL: [VnodeSharing; 6] = [
        VnodeSharing::DefaultShared,
        VnodeSharing::DefaultExcl,
        VnodeSharing::DefaultExclhost,
        VnodeSharing::IgnoreExcl,
        VnodeSharing::ForceExcl,
        VnodeSharing::ForceExclhost,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VnodeSharing::DefaultShared => "default_shared",
            VnodeSharing::DefaultExcl => "default_excl",
            VnodeSharing::DefaultExclhost => "default_exclhost",
            VnodeSharing::IgnoreExcl => "ignore_excl",
            VnodeSharing::ForceExcl => "force_excl",
            VnodeSharing::ForceExclhost => "force_exclhost",
        }
    }

    pub fn from_name(name: &str) -> Option<VnodeSharing> {
        VnodeSharing::ALL.iter().copied().find(|s| s.name().eq_ignore_ascii_case(name))
    }

    pub fn from_index(v: i64) -> Option<VnodeSharing> {
        VnodeSharing::ALL.iter().copied().find(|s| *s as i64 == v)
    }

    /// Integer values of old nodes files: 0..=3.
    pub fn from_legacy(v: i64) -> Option<VnodeSharing> {
        match v {
            0 => Some(VnodeSharing::DefaultShared),
            1 => Some(VnodeSharing::DefaultExcl),
            2 => Some(VnodeSharing::IgnoreExcl),
            3 => Some(VnodeSharing::ForceExcl),
            _ => None,
        }
    }
}

/// One allocatable cpu slot of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnode {
    pub index: i64,
    pub inuse: NodeState,
    pub jobs: Vec<JobId>,
}

#[derive(Debug, Clone)]
pub struct PbsNode {
    pub name: NodeName,
    pub hostname: String,
    /// Position in the server's node array.
    pub arr_index: usize,
    pub ntype: i64,
    pub state: NodeState,
    attrs: Vec<Attribute>,
    pub subnodes: Vec<Subnode>,
    /// Subnodes without a job.
    pub nsnfree: i64,
    /// Physical cpus, at least one until the Mom reports.
    pub ncpus: i64,
    pub moms: Vec<MomKey>,
    pub modified: NodeModified,
    /// A row for this node exists in the store.
    pub written: bool,
    pub pque: Option<QueueName>,
}

impl PbsNode {
    /// Builds a node in its initial `unknown|down` state with default attributes.
    ///
    /// # Returns
    /// `PbsError::System` if the Mom array cannot be allocated, `PbsError::Internal`
    /// if the `arch`, `mem` or `ncpus` definitions are missing.
    pub fn new(name: impl Into<String>, ntype: i64, defs: &ResourceDefs) -> Result<PbsNode, PbsError> {
        let mut moms = Vec::new();
        moms.try_reserve(1).map_err(|_| PbsError::System)?;

        let mut node = PbsNode {
            name: NodeName::new(name),
            hostname: String::new(),
            arr_index: 0,
            ntype,
            state: NodeState::UNKNOWN | NodeState::DOWN,
            attrs: vec![Attribute::default(); NodeAttr::COUNT],
            subnodes: Vec::new(),
            nsnfree: 0,
            ncpus: 1,
            moms,
            modified: NodeModified::EMPTY,
            written: false,
            pque: None,
        };

        let state_bits = node.state.bits() as i64;
        node.attr_mut(NodeAttr::State).set_default(AttrValue::Long(state_bits));
        node.attr_mut(NodeAttr::NType).set_default(AttrValue::Long(ntype));
        node.attr_mut(NodeAttr::Jobs).value = AttrValue::StrArray(Vec::new());
        node.attr_mut(NodeAttr::Resvs).value = AttrValue::StrArray(Vec::new());
        node.attr_mut(NodeAttr::ResvEnable).set_default(AttrValue::Bool(true));
        node.attr_mut(NodeAttr::Version).set_default(AttrValue::Str("unavailable".to_string()));
        node.attr_mut(NodeAttr::Sharing).set_default(AttrValue::Long(VnodeSharing::DefaultShared as i64));

        const SEEDED: [&str; 3] = ["arch", "mem", "ncpus"];
        if let Some(missing) = SEEDED.iter().find(|r| defs.find(r).is_none()) {
            log::error!("Resource definition '{}' missing, cannot initialize node {}", missing, node.name);
            return Err(PbsError::Internal);
        }
        let avail = node.available_mut();
        for required in SEEDED {
            avail.add_entry(required);
        }

        let assigned = node.attr_mut(NodeAttr::ResourceAssn);
        for def in defs.iter().filter(|d| d.is_consumable()) {
            let entry = assigned.resources_mut().add_entry(&def.name);
            entry.value = match def.rtype {
                ResourceType::Size => ResourceValue::Size("0kb".to_string()),
                _ => ResourceValue::Long(0),
            };
            entry.flags = AttrFlags::SET | AttrFlags::MODCACHE;
        }
        assigned.flags.insert(AttrFlags::SET | AttrFlags::MODCACHE);

        node.clear_modify_flags();
        Ok(node)
    }

    pub fn attr(&self, which: NodeAttr) -> &Attribute {
        &self.attrs[which.index()]
    }

    pub fn attr_mut(&mut self, which: NodeAttr) -> &mut Attribute {
        &mut self.attrs[which.index()]
    }

    pub fn attrs(&self) -> impl Iterator<Item = (NodeAttr, &Attribute)> {
        NodeAttr::ALL.iter().copied().zip(self.attrs.iter())
    }

    pub fn available(&self) -> Option<&ResourceList> {
        self.attr(NodeAttr::ResourceAvail).resources()
    }

    pub fn available_mut(&mut self) -> &mut ResourceList {
        self.attr_mut(NodeAttr::ResourceAvail).resources_mut()
    }

    pub fn assigned(&self) -> Option<&ResourceList> {
        self.attr(NodeAttr::ResourceAssn).resources()
    }

    pub fn assigned_mut(&mut self) -> &mut ResourceList {
        self.attr_mut(NodeAttr::ResourceAssn).resources_mut()
    }

    pub fn is_natural_vnode(&self) -> bool {
        self.name.as_str() == self.hostname
    }

    /// A vnode is up unless offline, offline by its Mom, down, deleted or stale.
    pub fn is_vnode_up(&self) -> bool {
        !self.state.intersects(NodeState::OFFLINE | NodeState::OFFLINE_BY_MOM | NodeState::DOWN | NodeState::DELETED | NodeState::STALE)
    }

    pub fn has_running_jobs(&self) -> bool {
        self.subnodes.iter().any(|sn| !sn.jobs.is_empty())
    }

    pub fn set_state(&mut self, bits: NodeState) {
        self.state.insert(bits);
        self.sync_state_attr();
    }

    pub fn clear_state(&mut self, bits: NodeState) {
        self.state.remove(bits);
        self.sync_state_attr();
    }

    fn sync_state_attr(&mut self) {
        let bits = self.state.bits() as i64;
        self.attr_mut(NodeAttr::State).set(AttrValue::Long(bits));
    }

    /// Attaches a job to subnode `index`, marking the slot busy.
    pub fn assign_job(&mut self, index: usize, job: JobId) -> Result<(), PbsError> {
        let subnode = self.subnodes.get_mut(index).ok_or(PbsError::IvalReq)?;
        if !subnode.inuse.contains(NodeState::JOB) {
            subnode.inuse.insert(NodeState::JOB);
            self.nsnfree -= 1;
        }
        subnode.jobs.push(job);
        Ok(())
    }

    pub fn release_job(&mut self, job: &JobId) {
        for subnode in &mut self.subnodes {
            subnode.jobs.retain(|j| j != job);
            if subnode.jobs.is_empty() && subnode.inuse.contains(NodeState::JOB) {
                subnode.inuse.remove(NodeState::JOB);
                self.nsnfree += 1;
            }
        }
    }

    pub fn clear_modify_flags(&mut self) {
        for attr in &mut self.attrs {
            attr.clear_modify();
        }
    }

    pub fn any_attr_modified(&self) -> bool {
        self.attrs.iter().any(Attribute::is_modified)
    }
}
