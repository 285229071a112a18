use std::collections::HashSet;
use std::ffi::CString;
use std::ptr;

use pbs_server_core::domain::shard::ffi::{self, server_instance_t};
use pbs_server_core::domain::shard::shard::{ServerInstance, ShardObjType, ShardRouter, pbs_shard_configured_num_servers};

fn router(max: i32, configured: usize) -> ShardRouter {
    let instances: Vec<ServerInstance> = (0..configured).map(|i| ServerInstance { hostname: format!("svr{}", i), port: 15001 }).collect();
    let mut router = ShardRouter::new();
    router.init(max, Some(&instances)).unwrap();
    router
}

#[test]
fn job_id_routes_to_the_same_shard_every_time() {
    let mut router = router(10, 3);
    for _ in 0..5 {
        assert_eq!(router.get_server_byindex(ShardObjType::Job, Some("107.server"), None), Some(1));
    }
    assert_eq!(router.get_server_byindex(ShardObjType::Reservation, Some("R5.server"), None), Some(0));
}

#[test]
fn ids_from_different_shards_never_collide() {
    let max_servers = 4;
    let router = router(max_servers, 4);
    let mut seen = HashSet::new();

    for shard in 0..max_servers {
        let mut id = -1;
        for _ in 0..50 {
            id = router.get_next_seqid(id, 9_999_999, shard);
            assert_eq!(id % max_servers as i64, shard as i64);
            assert!(seen.insert(id), "id {} handed out twice", id);
        }
    }
    assert_eq!(seen.len(), 200);
}

#[test]
fn every_inactive_shard_means_no_shard() {
    let mut router = router(3, 3);
    assert_eq!(router.get_server_byindex(ShardObjType::Node, Some("2"), Some(&[2, -1])), Some(0));
    assert_eq!(router.get_server_byindex(ShardObjType::Node, None, Some(&[0, 1, 2])), None);
}

#[test]
fn c_entry_points_share_the_process_router() {
    let hosts: Vec<CString> = (0..3).map(|i| CString::new(format!("svr{}", i)).unwrap()).collect();
    let instances: Vec<server_instance_t> = hosts.iter().map(|h| server_instance_t { hostname: h.as_ptr(), port: 15001 }).collect();
    let pointers: Vec<*const server_instance_t> = instances.iter().map(|i| i as *const server_instance_t).collect();

    assert_eq!(unsafe { ffi::pbs_shard_init(10, ptr::null(), 0) }, -1);
    assert_eq!(unsafe { ffi::pbs_shard_init(10, pointers.as_ptr(), pointers.len() as i32) }, 0);
    assert_eq!(pbs_shard_configured_num_servers(), 3);

    let job = CString::new("107.server").unwrap();
    assert_eq!(unsafe { ffi::pbs_shard_get_server_byindex(0, job.as_ptr(), ptr::null()) }, 1);

    let inactive = [1, -1];
    assert_eq!(unsafe { ffi::pbs_shard_get_server_byindex(0, job.as_ptr(), inactive.as_ptr()) }, 2);

    let all_down = [0, 1, 2];
    assert_eq!(unsafe { ffi::pbs_shard_get_server_byindex(0, job.as_ptr(), all_down.as_ptr()) }, -1);

    let random = unsafe { ffi::pbs_shard_get_server_byindex(-1, ptr::null(), ptr::null()) };
    assert!((0..3).contains(&random));

    assert_eq!(ffi::pbs_shard_get_next_seqid(-1, 100, 2), 2);
    assert_eq!(ffi::pbs_shard_get_next_seqid(92, 100, 2), 1);
}
