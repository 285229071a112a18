#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use pbs_server_core::domain::attribute::attr_list::AttrList;
use pbs_server_core::domain::attribute::flags::AttrFlags;
use pbs_server_core::domain::clock::clock_mock::MockClock;
use pbs_server_core::domain::node::node::PbsNode;
use pbs_server_core::domain::node::node_store::NodeKey;
use pbs_server_core::domain::persistence::memory_backend::MemoryBackend;
use pbs_server_core::domain::server::config::ServerConfig;
use pbs_server_core::domain::server::fatal::FatalHandler;
use pbs_server_core::domain::server::server::{Server, ServerState};

pub const START_TIME: i64 = 1_700_000_000;

/// Fatal handler that only counts how often it was reached.
#[derive(Debug, Clone, Default)]
pub struct CountingFatal {
    pub calls: Arc<AtomicUsize>,
}

impl CountingFatal {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FatalHandler for CountingFatal {
    fn panic_stop(&self, _msg: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Fixture {
    pub server: Server,
    pub store: MemoryBackend,
    pub clock: MockClock,
    pub fatal: CountingFatal,
    pub home: TempDir,
}

impl Fixture {
    /// A second server sharing this fixture's store, as after a restart.
    pub fn restart(&self, configure: impl FnOnce(&mut ServerConfig)) -> (Server, CountingFatal) {
        let mut config = ServerConfig::new("svr.example.com", self.home.path());
        configure(&mut config);
        let fatal = CountingFatal::default();
        let mut server =
            Server::new(config, Box::new(self.store.clone()), Arc::new(self.clock.clone())).with_fatal_handler(Box::new(fatal.clone()));
        server.connect().unwrap();
        (server, fatal)
    }

    pub fn node(&self, name: &str) -> &PbsNode {
        let key = self.key(name);
        self.server.nodes.get(key).unwrap()
    }

    pub fn key(&self, name: &str) -> NodeKey {
        self.server.find_nodebyname(name).unwrap_or_else(|| panic!("node {} not found", name))
    }

    /// Creates `name` with `ncpus` cpus and any further `resources_available` entries.
    pub fn add_node(&mut self, name: &str, ncpus: i64, resources: &[(&str, &str)]) -> NodeKey {
        let mut attrs = AttrList::new();
        attrs.add("resources_available", Some("ncpus"), ncpus.to_string(), AttrFlags::SET);
        for (resc, value) in resources {
            attrs.add("resources_available", Some(resc), *value, AttrFlags::SET);
        }
        self.server.create_pbs_node(name, &attrs, false).unwrap()
    }
}

pub fn fixture() -> Fixture {
    fixture_with(|_| {})
}

/// Connected server in `Run` state over a fresh in-memory store and a temporary home.
pub fn fixture_with(configure: impl FnOnce(&mut ServerConfig)) -> Fixture {
    let home = tempfile::tempdir().unwrap();
    let clock = MockClock::new(START_TIME);
    let store = MemoryBackend::new(Arc::new(clock.clone()));
    let fatal = CountingFatal::default();

    let mut config = ServerConfig::new("svr.example.com", home.path());
    configure(&mut config);
    let mut server = Server::new(config, Box::new(store.clone()), Arc::new(clock.clone())).with_fatal_handler(Box::new(fatal.clone()));
    server.connect().unwrap();
    server.state = ServerState::Run;

    Fixture { server, store, clock, fatal, home }
}

pub fn attrs(entries: &[(&str, Option<&str>, &str)]) -> AttrList {
    let mut list = AttrList::new();
    for (name, resc, value) in entries {
        list.add(name, *resc, *value, AttrFlags::SET);
    }
    list
}
