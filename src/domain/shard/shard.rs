//! Routing of objects to server shards and per-shard sequence ids.

use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::domain::clock::clock::{SharedClock, SystemClock};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShardError {
    #[error("No server instance list supplied")]
    NoInstances,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardObjType {
    Others = -1,
    Job = 0,
    Reservation = 1,
    Node = 2,
}

impl ShardObjType {
    pub fn from_i32(v: i32) -> ShardObjType {
        match v {
            0 => ShardObjType::Job,
            1 => ShardObjType::Reservation,
            2 => ShardObjType::Node,
            _ => ShardObjType::Others,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInstance {
    pub hostname: String,
    pub port: i32,
}

/// Routing configuration. `max_servers` is the ceiling ids are spread over;
/// the instance list is what is configured today and may be shorter.
#[derive(Debug)]
pub struct ShardRouter {
    max_servers: i32,
    instances: Vec<ServerInstance>,
    configured: bool,
    rng: Option<StdRng>,
    clock: SharedClock,
}

impl Default for ShardRouter {
    fn default() -> Self {
        ShardRouter::with_clock(Arc::new(SystemClock))
    }
}

/// Leading decimal digits of `id` (`"107.server"` -> 107), 0 when there are none.
fn parse_leading_u64(id: &str) -> u64 {
    let digits: &str = &id[..id.find(|c: char| !c.is_ascii_digit()).unwrap_or(id.len())];
    digits.parse().unwrap_or(0)
}

impl ShardRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        ShardRouter { max_servers: 0, instances: Vec::new(), configured: false, rng: None, clock }
    }

    pub fn init(&mut self, max_servers: i32, instances: Option<&[ServerInstance]>) -> Result<(), ShardError> {
        let instances = instances.ok_or(ShardError::NoInstances)?;
        self.max_servers = max_servers;
        self.instances = instances.to_vec();
        self.configured = true;
        log::debug!("Shard routing over {} configured of at most {} servers", self.instances.len(), max_servers);
        Ok(())
    }

    pub fn max_servers(&self) -> i32 {
        self.max_servers
    }

    pub fn configured_num_servers(&self) -> usize {
        self.instances.len()
    }

    pub fn instance(&self, index: usize) -> Option<&ServerInstance> {
        self.instances.get(index)
    }

    /// Picks the shard owning `obj_id`, or a random configured shard when there is no id,
    /// then steps past shards listed in `inactive` (read up to a `-1` sentinel).
    ///
    /// # Returns
    /// `None` when unconfigured or when every configured shard is inactive.
    pub fn get_server_byindex(&mut self, _obj_type: ShardObjType, obj_id: Option<&str>, inactive: Option<&[i32]>) -> Option<usize> {
        if !self.configured || self.max_servers <= 0 || self.instances.is_empty() {
            return None;
        }
        let configured = self.instances.len();

        let mut index = match obj_id {
            Some(id) => (parse_leading_u64(id) % self.max_servers as u64) as usize,
            None => {
                let clock = &self.clock;
                let rng = self.rng.get_or_insert_with(|| StdRng::seed_from_u64(clock.now_us() as u64));
                rng.random_range(0..configured)
            }
        };
        // Ids spread over max_servers; fold the ones beyond the configured range back in.
        if index >= configured {
            index %= configured;
        }

        let inactive: Vec<usize> =
            inactive.unwrap_or(&[]).iter().take(configured).take_while(|&&i| i != -1).filter_map(|&i| usize::try_from(i).ok()).collect();

        for _ in 0..configured {
            if !inactive.contains(&index) {
                return Some(index);
            }
            index = (index + 1) % configured;
        }
        None
    }

    /// Next sequence id for shard `svr_index` after `curr` (`-1` for the first one).
    /// Shard `k` produces `k, k + M, k + 2M, ...` for `M = max_servers`, wrapping past `max_seq_id`.
    pub fn get_next_seqid(&self, curr: i64, max_seq_id: i64, svr_index: i32) -> i64 {
        if curr == -1 {
            return svr_index as i64;
        }
        let m = self.max_servers as i64;
        if m <= 0 {
            return -1;
        }
        let next = (curr / m).saturating_mul(m).saturating_add(svr_index as i64 + m);
        if next > max_seq_id { next - (max_seq_id + 1) } else { next }
    }
}

lazy_static! {
    static ref ROUTER: Mutex<ShardRouter> = Mutex::new(ShardRouter::new());
}

fn router() -> std::sync::MutexGuard<'static, ShardRouter> {
    ROUTER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Configures the process-wide router. Returns -1 without an instance list.
pub fn pbs_shard_init(max_allowed_servers: i32, instances: Option<&[ServerInstance]>) -> i32 {
    match router().init(max_allowed_servers, instances) {
        Ok(()) => 0,
        Err(e) => {
            log::error!("pbs_shard_init: {}", e);
            -1
        }
    }
}

/// Index of the shard for the object, -1 if none is available.
pub fn pbs_shard_get_server_byindex(obj_type: i32, obj_id: Option<&str>, inactive_servers: Option<&[i32]>) -> i32 {
    router()
        .get_server_byindex(ShardObjType::from_i32(obj_type), obj_id, inactive_servers)
        .and_then(|index| i32::try_from(index).ok())
        .unwrap_or(-1)
}

pub fn pbs_shard_get_next_seqid(curr_seq_id: i64, max_seq_id: i64, svr_index: i32) -> i64 {
    router().get_next_seqid(curr_seq_id, max_seq_id, svr_index)
}

pub fn pbs_shard_configured_num_servers() -> usize {
    router().configured_num_servers()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances(n: usize) -> Vec<ServerInstance> {
        (0..n).map(|i| ServerInstance { hostname: format!("s{}", i), port: 15001 }).collect()
    }

    fn router_with(max: i32, configured: usize) -> ShardRouter {
        let mut router = ShardRouter::new();
        router.init(max, Some(&instances(configured))).unwrap();
        router
    }

    #[test]
    fn init_requires_an_instance_list() {
        let mut router = ShardRouter::new();
        assert_eq!(router.init(4, None), Err(ShardError::NoInstances));
        assert_eq!(router.get_server_byindex(ShardObjType::Job, Some("1"), None), None);
    }

    #[test]
    fn id_routes_modulo_max_then_folds_into_configured_range() {
        let mut router = router_with(10, 3);
        assert_eq!(router.get_server_byindex(ShardObjType::Job, Some("107"), None), Some(1));
        assert_eq!(router.get_server_byindex(ShardObjType::Job, Some("107.svr"), None), Some(1));
        assert_eq!(router.get_server_byindex(ShardObjType::Job, Some("12"), None), Some(2));
    }

    #[test]
    fn inactive_servers_are_skipped_and_list_stops_at_sentinel() {
        let mut router = router_with(4, 4);
        assert_eq!(router.get_server_byindex(ShardObjType::Job, Some("1"), Some(&[1, 2, -1])), Some(3));
        assert_eq!(router.get_server_byindex(ShardObjType::Job, Some("1"), Some(&[1, -1, 2])), Some(2));
        assert_eq!(router.get_server_byindex(ShardObjType::Job, Some("3"), Some(&[3, -1])), Some(0), "Probe wraps around");
        assert_eq!(router.get_server_byindex(ShardObjType::Job, Some("3"), Some(&[0, 1, 2, 3])), None);
    }

    #[test]
    fn random_pick_stays_within_configured_servers() {
        let mut router = router_with(16, 3);
        for _ in 0..50 {
            let index = router.get_server_byindex(ShardObjType::Others, None, None).unwrap();
            assert!(index < 3);
        }
    }

    #[test]
    fn seqid_starts_at_shard_index_and_wraps() {
        let router = router_with(4, 4);
        assert_eq!(router.get_next_seqid(-1, 100, 2), 2);
        assert_eq!(router.get_next_seqid(2, 100, 2), 6);
        assert_eq!(router.get_next_seqid(6, 100, 2), 10);
        assert_eq!(router.get_next_seqid(98, 100, 2), 1, "102 wraps to 102 - 101");
    }

    #[test]
    fn leading_digits_are_used() {
        assert_eq!(parse_leading_u64("123.host"), 123);
        assert_eq!(parse_leading_u64("abc"), 0);
        assert_eq!(parse_leading_u64(""), 0);
    }
}
