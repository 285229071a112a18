mod common;

use std::fs;

use common::{attrs, fixture_with};

use pbs_server_core::domain::node::actions::ActionMode;
use pbs_server_core::domain::node::node::{LICENSED_LOCKED, NodeAttr, NodeModified};
use pbs_server_core::domain::server::server::ServerState;
use pbs_server_core::error::PbsError;

fn hwloc(sockets: usize) -> String {
    let packages: String = (0..sockets).map(|i| format!(r#"<object type="Package" os_index="{}"/>"#, i)).collect();
    format!("hwloc:<topology>{}</topology>", packages)
}

fn report(fx: &mut common::Fixture, node: &str, payload: &str) -> Result<(), PbsError> {
    let key = fx.key(node);
    fx.server.set_node_attribute(key, NodeAttr::TopologyInfo, Some(payload), ActionMode::Alter)
}

fn licensed(fx: &common::Fixture, node: &str) -> bool {
    fx.node(node).attr(NodeAttr::License).as_char() == Some(LICENSED_LOCKED)
}

fn license_info(fx: &common::Fixture, node: &str) -> Option<i64> {
    fx.node(node).attr(NodeAttr::LicenseInfo).as_long()
}

#[test]
fn sockets_are_licensed_while_the_pool_lasts() {
    let mut fx = fixture_with(|config| config.sockets_available = 4);
    fx.add_node("n1", 1, &[]);
    fx.add_node("n2", 1, &[]);

    report(&mut fx, "n1", &hwloc(2)).unwrap();
    assert!(licensed(&fx, "n1"));
    assert_eq!(license_info(&fx, "n1"), Some(2));
    assert_eq!(fx.server.licenses.available(), 2);
    assert!(fx.node("n1").modified.contains(NodeModified::UPDATE_OTHERS));

    report(&mut fx, "n2", &hwloc(3)).unwrap();
    assert!(!licensed(&fx, "n2"));
    assert_eq!(license_info(&fx, "n2"), Some(3));
    assert_eq!(fx.server.licenses.available(), 2);

    report(&mut fx, "n1", &hwloc(2)).unwrap();
    assert!(licensed(&fx, "n1"));
    assert_eq!(fx.server.licenses.available(), 2);
}

#[test]
fn changed_socket_count_swaps_the_licenses() {
    let mut fx = fixture_with(|config| config.sockets_available = 4);
    fx.add_node("n1", 1, &[]);

    report(&mut fx, "n1", &hwloc(3)).unwrap();
    report(&mut fx, "n1", "Windows:numa=1,sockets=1").unwrap();

    assert!(licensed(&fx, "n1"));
    assert_eq!(license_info(&fx, "n1"), Some(1));
    assert_eq!(fx.server.licenses.available(), 3);
    assert_eq!(fx.node("n1").attr(NodeAttr::TopologyInfo).as_str(), Some("Windows:numa=1,sockets=1"));
}

#[test]
fn deleting_a_licensed_node_frees_licenses_for_others() {
    let mut fx = fixture_with(|config| config.sockets_available = 4);
    fx.add_node("n1", 1, &[]);
    fx.add_node("n2", 1, &[]);
    report(&mut fx, "n1", &hwloc(2)).unwrap();
    report(&mut fx, "n2", &hwloc(3)).unwrap();
    let topology_file = fx.server.topology_dir().join("n1");
    assert!(topology_file.exists());
    assert!(fs::read_to_string(&topology_file).unwrap().starts_with("<topology>"));

    let key = fx.key("n1");
    fx.server.effective_node_delete(key).unwrap();

    assert!(!topology_file.exists());
    assert!(licensed(&fx, "n2"));
    assert_eq!(fx.server.licenses.available(), 1);
}

#[test]
fn no_license_pool_leaves_nodes_unlicensed() {
    let mut fx = fixture_with(|_| {});
    fx.add_node("n1", 1, &[]);

    report(&mut fx, "n1", "Cray:<socket/><socket/>").unwrap();

    assert!(!licensed(&fx, "n1"));
    assert_eq!(license_info(&fx, "n1"), Some(2));
}

#[test]
fn topology_payload_must_name_its_type() {
    let mut fx = fixture_with(|config| config.sockets_available = 4);
    let key = fx.add_node("n1", 1, &[]);

    assert_eq!(report(&mut fx, "n1", "solaris:<x/>"), Err(PbsError::Internal));
    assert!(fx.node("n1").attr(NodeAttr::TopologyInfo).as_str().is_none());
    assert_eq!(fx.server.set_node_topology(key, &hwloc(1), ActionMode::Recov), Err(PbsError::Internal));
    assert_eq!(fx.server.set_node_topology(key, &hwloc(1), ActionMode::Noop), Ok(()));
    assert_eq!(fx.server.licenses.available(), 4);
}

#[test]
fn recovered_licenses_are_taken_from_the_pool_again() {
    let mut fx = fixture_with(|config| config.sockets_available = 4);
    fx.add_node("n1", 1, &[]);
    report(&mut fx, "n1", &hwloc(4)).unwrap();
    fx.server.save_nodes_db(false, None).unwrap();

    let (mut restarted, _) = fx.restart(|config| config.sockets_available = 4);
    restarted.setup_nodes().unwrap();
    let n1 = restarted.find_nodebyname("n1").unwrap();
    assert_eq!(restarted.nodes.get(n1).unwrap().attr(NodeAttr::License).as_char(), Some(LICENSED_LOCKED));
    assert_eq!(restarted.licenses.available(), 0);

    restarted.state = ServerState::Run;
    let n2 = restarted.create_pbs_node("n2", &attrs(&[("resources_available", Some("ncpus"), "1")]), false).unwrap();
    restarted.set_node_attribute(n2, NodeAttr::TopologyInfo, Some(&hwloc(4)), ActionMode::Alter).unwrap();
    assert_ne!(restarted.nodes.get(n2).unwrap().attr(NodeAttr::License).as_char(), Some(LICENSED_LOCKED));
    assert_eq!(restarted.licenses.available(), 0);
}

#[test]
fn recovered_license_beyond_a_smaller_pool_is_dropped() {
    let mut fx = fixture_with(|config| config.sockets_available = 4);
    fx.add_node("n1", 1, &[]);
    report(&mut fx, "n1", &hwloc(4)).unwrap();
    fx.server.save_nodes_db(false, None).unwrap();

    let (mut restarted, _) = fx.restart(|config| config.sockets_available = 2);
    restarted.setup_nodes().unwrap();
    let n1 = restarted.nodes.get(restarted.find_nodebyname("n1").unwrap()).unwrap();
    assert_ne!(n1.attr(NodeAttr::License).as_char(), Some(LICENSED_LOCKED));
    assert_eq!(n1.attr(NodeAttr::LicenseInfo).as_long(), Some(4));
    assert!(n1.modified.contains(NodeModified::UPDATE_OTHERS));
    assert_eq!(restarted.licenses.available(), 2);
}
