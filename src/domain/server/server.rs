use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use crate::domain::attribute::resource::ResourceDefs;
use crate::domain::clock::clock::SharedClock;
use crate::domain::license::license::{LicenseManager, LicensePool};
use crate::domain::mom::mom_store::MomStore;
use crate::domain::node::node_store::{NodeKey, NodeStore};
use crate::domain::persistence::backend::DbBackend;
use crate::domain::persistence::connection::DbConnection;
use crate::domain::queue::queue::Queue;
use crate::domain::scheduler::scheduler::Scheduler;
use crate::domain::server::config::ServerConfig;
use crate::domain::server::fatal::{FatalHandler, PanicStop};
use crate::domain::utils::id::{JobId, QueueName};
use crate::domain::work_task::work_task::{WorkTask, WorkTaskQueue};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Recovering objects from the store; indirect targets may not exist yet.
    Init,
    Run,
    Shutdown,
}

/// Generation stamp of the host-to-vnode map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MomInfoTime {
    pub time: i64,
    pub generation: i32,
}

/// The server's node engine: node table, Moms, queues, schedulers and the store connection.
/// All mutation happens from one thread between save points.
#[derive(Debug)]
pub struct Server {
    pub name: String,
    pub home: PathBuf,
    pub state: ServerState,
    pub defs: ResourceDefs,
    pub nodes: NodeStore,
    pub moms: MomStore,
    pub queues: BTreeMap<QueueName, Queue>,
    /// Some queue has nodes associated.
    pub que_has_nodes: bool,
    pub scheds: Vec<Scheduler>,
    pub licenses: Box<dyn LicenseManager>,
    pub tasks: WorkTaskQueue,
    pub mominfo_time: MomInfoTime,
    /// The node table changed in a way that must reach the store before shutdown.
    pub chng_nodes_file: bool,
    pub node_group_key: Option<String>,
    /// Jobs currently suspended by an administrator.
    pub admin_suspended: HashSet<JobId>,
    pub conn: DbConnection,
    pub clock: SharedClock,
    fatal: Box<dyn FatalHandler>,
    mom_fqdn_cache: HashMap<String, String>,
}

impl Server {
    pub fn new(config: ServerConfig, backend: Box<dyn DbBackend>, clock: SharedClock) -> Server {
        let conn = DbConnection::init(backend, &config.database.host, config.database.timeout);
        let queues = config.queues.into_iter().map(|q| (q.name.clone(), q)).collect();

        let mut server = Server {
            name: config.server_name,
            home: config.pbs_home,
            state: ServerState::Init,
            defs: config.defs,
            nodes: NodeStore::new(),
            moms: MomStore::new(),
            queues,
            que_has_nodes: false,
            scheds: Vec::new(),
            licenses: Box::new(LicensePool::new(config.sockets_available, config.nodes_licensing)),
            tasks: WorkTaskQueue::new(),
            mominfo_time: MomInfoTime::default(),
            chng_nodes_file: false,
            node_group_key: config.node_group_key,
            admin_suspended: HashSet::new(),
            conn,
            clock,
            fatal: Box::new(PanicStop),
            mom_fqdn_cache: HashMap::new(),
        };
        server.sched_alloc(crate::domain::scheduler::scheduler::DEFAULT_SCHED_NAME);
        server
    }

    pub fn with_fatal_handler(mut self, fatal: Box<dyn FatalHandler>) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn with_license_manager(mut self, licenses: Box<dyn LicenseManager>) -> Self {
        self.licenses = licenses;
        self
    }

    /// Connects to the store and prepares statements.
    pub fn connect(&mut self) -> Result<()> {
        self.conn.connect()?;
        self.conn.prepare_statements()?;
        log::info!("Server {} connected to data store", self.name);
        Ok(())
    }

    pub fn server_priv(&self) -> PathBuf {
        self.home.join("server_priv")
    }

    /// Directory holding one topology file per node.
    pub fn topology_dir(&self) -> PathBuf {
        self.server_priv().join("topology")
    }

    pub(crate) fn panic_stop(&self, msg: &str) {
        self.fatal.panic_stop(msg);
    }

    /// Canonical name of a Mom host, resolved once and cached.
    pub(crate) fn resolve_mom_host(&mut self, host: &str) -> String {
        if let Some(known) = self.mom_fqdn_cache.get(host) {
            return known.clone();
        }
        let resolved = host.trim().to_ascii_lowercase();
        self.mom_fqdn_cache.insert(host.to_string(), resolved.clone());
        resolved
    }

    pub fn find_nodebyname(&self, name: &str) -> Option<NodeKey> {
        self.nodes.find_by_name(name)
    }

    /// Natural vnode of the Mom owning `addr`.
    pub fn find_nodebyaddr(&self, addr: u32) -> Option<NodeKey> {
        let mom = self.moms.find_by_addr(addr)?;
        self.moms.get(mom)?.natural_vnode()
    }

    pub fn is_vnode_up(&self, name: &str) -> bool {
        self.find_nodebyname(name).and_then(|key| self.nodes.get(key)).is_some_and(|node| node.is_vnode_up())
    }

    /// Drains deferred tasks. Returns how many ran.
    pub fn run_work_tasks(&mut self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.tasks.pop() {
            match task {
                WorkTask::IndirectTargetCheck => self.indirect_target_check(),
            }
            ran += 1;
        }
        ran
    }
}
