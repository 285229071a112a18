mod common;

use common::fixture;

use pbs_server_core::domain::node::node::{NodeAttr, NodeState};
use pbs_server_core::domain::persistence::db_object::DbObjectType;
use pbs_server_core::domain::utils::id::JobId;
use pbs_server_core::error::{Error, PbsError};

const EXEC_VNODE: &str = "(n1:ncpus=1)+(n2:ncpus=1:mem=1gb)";

#[test]
fn suspend_and_resume_toggle_maintenance() {
    let mut fx = fixture();
    fx.add_node("n1", 1, &[]);
    fx.add_node("n2", 1, &[]);
    fx.add_node("n3", 1, &[]);
    let job = JobId::new("12.svr");

    fx.server.set_admin_suspend(&job, EXEC_VNODE, true).unwrap();

    for name in ["n1", "n2"] {
        let node = fx.node(name);
        assert!(node.state.contains(NodeState::MAINTENANCE));
        assert_eq!(node.attr(NodeAttr::MaintJobs).as_str_array(), ["12.svr".to_string()]);
    }
    assert!(!fx.node("n3").state.contains(NodeState::MAINTENANCE));
    assert!(fx.server.admin_suspended.contains(&job));
    assert_eq!(fx.store.row_count(DbObjectType::Node), 3);

    fx.server.set_admin_suspend(&job, EXEC_VNODE, false).unwrap();

    assert!(!fx.node("n1").state.contains(NodeState::MAINTENANCE));
    assert!(!fx.node("n2").attr(NodeAttr::MaintJobs).is_set());
    assert!(fx.server.admin_suspended.is_empty());
}

#[test]
fn node_stays_in_maintenance_while_another_job_holds_it() {
    let mut fx = fixture();
    fx.add_node("n1", 2, &[]);
    let first = JobId::new("1.svr");
    let second = JobId::new("2.svr");

    fx.server.set_admin_suspend(&first, "(n1:ncpus=1)", true).unwrap();
    fx.server.set_admin_suspend(&second, "(n1:ncpus=1)", true).unwrap();
    fx.server.set_admin_suspend(&first, "(n1:ncpus=1)", false).unwrap();

    let node = fx.node("n1");
    assert!(node.state.contains(NodeState::MAINTENANCE));
    assert_eq!(node.attr(NodeAttr::MaintJobs).as_str_array(), ["2.svr".to_string()]);
}

#[test]
fn suspend_twice_or_resume_unsuspended_is_refused() {
    let mut fx = fixture();
    fx.add_node("n1", 1, &[]);
    let job = JobId::new("7.svr");

    assert!(matches!(fx.server.set_admin_suspend(&job, "(n1:ncpus=1)", false), Err(Error::Request(PbsError::WrongResume))));
    fx.server.set_admin_suspend(&job, "(n1:ncpus=1)", true).unwrap();
    assert!(matches!(fx.server.set_admin_suspend(&job, "(n1:ncpus=1)", true), Err(Error::Request(PbsError::BadState))));
}

#[test]
fn maintenance_survives_a_restart() {
    let mut fx = fixture();
    fx.add_node("n1", 1, &[]);
    fx.add_node("n2", 1, &[]);
    let job = JobId::new("12.svr");
    fx.server.set_admin_suspend(&job, EXEC_VNODE, true).unwrap();

    let (mut restarted, _) = fx.restart(|_| {});
    restarted.setup_nodes().unwrap();

    assert!(restarted.admin_suspended.contains(&job));
    let n2 = restarted.nodes.get(restarted.find_nodebyname("n2").unwrap()).unwrap();
    assert!(n2.state.contains(NodeState::MAINTENANCE));

    restarted.set_admin_suspend(&job, EXEC_VNODE, false).unwrap();
    assert!(restarted.admin_suspended.is_empty());
}
