use slotmap::{SlotMap, new_key_type};
use std::collections::{BTreeMap, HashMap};

use crate::domain::node::node::NodeState;
use crate::domain::node::node_store::NodeKey;

new_key_type! {
    pub struct MomKey;
}

pub const PBS_MOM_SERVICE_PORT: u16 = 15002;

/// One execution host (Mom) known to the server.
#[derive(Debug, Clone)]
pub struct MomInfo {
    pub host: String,
    pub port: u16,
    pub rm_port: u16,
    pub modtime: i64,
    pub state: NodeState,
    /// Vnodes reported by this Mom; index 0 is the natural vnode.
    pub children: Vec<NodeKey>,
    pub addrs: Vec<u32>,
    /// Vnode pool this Mom belongs to, 0 when none.
    pub vnode_pool: i64,
}

impl MomInfo {
    pub fn natural_vnode(&self) -> Option<NodeKey> {
        self.children.first().copied()
    }
}

#[derive(Debug, Default)]
pub struct MomStore {
    slots: SlotMap<MomKey, MomInfo>,
    order: Vec<MomKey>,
    name_index: HashMap<(String, u16), MomKey>,
    iplist: HashMap<u32, MomKey>,
    pools: BTreeMap<i64, Vec<MomKey>>,
}

impl MomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, host: &str, port: u16) -> Option<MomKey> {
        self.name_index.get(&(host.to_string(), port)).copied()
    }

    /// Returns the Mom for `host:port`, creating it when unknown.
    pub fn find_or_create(&mut self, host: &str, port: u16) -> MomKey {
        if let Some(key) = self.find(host, port) {
            return key;
        }
        let mom = MomInfo {
            host: host.to_string(),
            port,
            rm_port: port.wrapping_add(1),
            modtime: 0,
            state: NodeState::DOWN,
            children: Vec::new(),
            addrs: Vec::new(),
            vnode_pool: 0,
        };
        let key = self.slots.insert(mom);
        self.order.push(key);
        self.name_index.insert((host.to_string(), port), key);
        log::debug!("Created Mom entry {}:{}", host, port);
        key
    }

    pub fn get(&self, key: MomKey) -> Option<&MomInfo> {
        self.slots.get(key)
    }

    pub fn get_mut(&mut self, key: MomKey) -> Option<&mut MomInfo> {
        self.slots.get_mut(key)
    }

    /// Deletes the Mom record. Address and pool entries must be dropped beforehand.
    pub fn remove(&mut self, key: MomKey) -> Option<MomInfo> {
        let mom = self.slots.remove(key)?;
        self.order.retain(|k| *k != key);
        self.name_index.remove(&(mom.host.clone(), mom.port));
        Some(mom)
    }

    pub fn add_address(&mut self, key: MomKey, addr: u32) {
        if let Some(mom) = self.slots.get_mut(key) {
            if !mom.addrs.contains(&addr) {
                mom.addrs.push(addr);
            }
            self.iplist.insert(addr, key);
        }
    }

    pub fn find_by_addr(&self, addr: u32) -> Option<MomKey> {
        self.iplist.get(&addr).copied()
    }

    /// Drops every address-list entry pointing at this Mom.
    pub fn delete_addresses(&mut self, key: MomKey) {
        self.iplist.retain(|_, owner| *owner != key);
        if let Some(mom) = self.slots.get_mut(key) {
            mom.addrs.clear();
        }
    }

    pub fn add_to_pool(&mut self, key: MomKey, pool: i64) {
        let Some(mom) = self.slots.get_mut(key) else {
            return;
        };
        mom.vnode_pool = pool;
        let members = self.pools.entry(pool).or_default();
        if !members.contains(&key) {
            members.push(key);
        }
    }

    pub fn remove_from_pool(&mut self, key: MomKey) {
        let Some(mom) = self.slots.get_mut(key) else {
            return;
        };
        let pool = std::mem::take(&mut mom.vnode_pool);
        if let Some(members) = self.pools.get_mut(&pool) {
            members.retain(|k| *k != key);
            if members.is_empty() {
                self.pools.remove(&pool);
            }
        }
    }

    pub fn pool_members(&self, pool: i64) -> &[MomKey] {
        self.pools.get(&pool).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keys in creation order.
    pub fn keys(&self) -> Vec<MomKey> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MomKey, &MomInfo)> {
        self.order.iter().filter_map(|key| self.slots.get(*key).map(|mom| (*key, mom)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
