mod common;

use common::{attrs, fixture, fixture_with};

use pbs_server_core::domain::attribute::attr_list::AttrList;
use pbs_server_core::domain::attribute::flags::AttrFlags;
use pbs_server_core::domain::attribute::value::AttrValue;
use pbs_server_core::domain::node::actions::ActionMode;
use pbs_server_core::domain::node::characteristic::WriteGranularity;
use pbs_server_core::domain::node::node::{NodeAttr, NodeModified, NodeState};
use pbs_server_core::domain::queue::queue::{Queue, QueueType};
use pbs_server_core::error::{Error, PbsError};

#[test]
fn new_node_gets_one_subnode_per_cpu() {
    let mut fx = fixture();
    let key = fx.add_node("n1", 4, &[]);

    let node = fx.server.nodes.get(key).unwrap();
    assert_eq!(node.subnodes.len(), 4);
    assert_eq!(node.nsnfree, 4);
    assert_eq!(node.state, NodeState::UNKNOWN | NodeState::DOWN);
    assert!(node.modified.contains(NodeModified::UPDATE_OTHERS));
    assert_eq!(node.attr(NodeAttr::Mom).as_str_array(), ["n1".to_string()]);
    assert_eq!(node.attr(NodeAttr::Port).as_long(), Some(15002));
    assert!(fx.server.chng_nodes_file);
}

#[test]
fn lowering_ncpus_drops_tail_subnodes() {
    let mut fx = fixture();
    let key = fx.add_node("n1", 4, &[]);

    let change = attrs(&[("resources_available", Some("ncpus"), "2")]);
    fx.server.set_node_resources(key, change.iter(), ActionMode::Alter, false).unwrap();

    let node = fx.node("n1");
    assert_eq!(node.subnodes.len(), 2);
    assert_eq!(node.subnodes.iter().map(|s| s.index).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(node.available().unwrap().find("ncpus").unwrap().value.as_long(), Some(2));
}

#[test]
fn negative_ncpus_is_rejected_without_change() {
    let mut fx = fixture();
    let key = fx.add_node("n1", 4, &[]);

    let change = attrs(&[("resources_available", Some("ncpus"), "-1")]);
    let result = fx.server.set_node_resources(key, change.iter(), ActionMode::Alter, false);

    assert_eq!(result, Err(PbsError::BadAtVal));
    assert_eq!(fx.node("n1").subnodes.len(), 4);
}

#[test]
fn default_ncpus_is_one_and_follows_pcpus() {
    let mut fx = fixture();
    let key = fx.server.create_pbs_node("n1", &AttrList::new(), false).unwrap();

    let ncpus = fx.node("n1").available().unwrap().find("ncpus").unwrap().clone();
    assert_eq!(ncpus.value.as_long(), Some(1));
    assert!(ncpus.flags.contains(AttrFlags::DEFLT));
    assert_eq!(fx.node("n1").ncpus, 1);

    fx.server.set_node_attribute(key, NodeAttr::Pcpus, Some("8"), ActionMode::Alter).unwrap();
    let node = fx.node("n1");
    assert_eq!(node.ncpus, 8);
    assert_eq!(node.subnodes.len(), 8);
    assert_eq!(node.available().unwrap().find("ncpus").unwrap().value.as_long(), Some(8));
}

#[test]
fn pcpus_does_not_override_explicit_ncpus() {
    let mut fx = fixture();
    let key = fx.add_node("n1", 2, &[]);

    fx.server.set_node_attribute(key, NodeAttr::Pcpus, Some("16"), ActionMode::Alter).unwrap();

    let node = fx.node("n1");
    assert_eq!(node.ncpus, 16);
    assert_eq!(node.subnodes.len(), 2);
}

#[test]
fn characteristic_check_classifies_changes() {
    let mut fx = fixture();
    let key = fx.add_node("n1", 1, &[]);
    fx.server.nodes.get_mut(key).unwrap().clear_modify_flags();

    let mut snap = fx.server.nodes.save_characteristic(key).unwrap();
    fx.server.nodes.get_mut(key).unwrap().set_state(NodeState::OFFLINE);
    assert_eq!(fx.server.nodes.chk_characteristic(&mut snap, key).unwrap(), WriteGranularity::StateFile);
    assert_eq!(fx.node("n1").modified, NodeModified::UPDATE_STATE);

    let mut snap = fx.server.nodes.save_characteristic(key).unwrap();
    fx.server.nodes.get_mut(key).unwrap().attr_mut(NodeAttr::Comment).set(AttrValue::Str("bad fan".into()));
    assert_eq!(fx.server.nodes.chk_characteristic(&mut snap, key).unwrap(), WriteGranularity::StateFile);
    assert_eq!(fx.node("n1").modified, NodeModified::UPDATE_COMMENT);
    fx.server.nodes.get_mut(key).unwrap().clear_modify_flags();

    let mut snap = fx.server.nodes.save_characteristic(key).unwrap();
    assert_eq!(fx.server.nodes.chk_characteristic(&mut snap, key).unwrap(), WriteGranularity::None);

    let mut snap = fx.server.nodes.save_characteristic(key).unwrap();
    fx.server.nodes.get_mut(key).unwrap().set_state(NodeState::DELETED);
    assert_eq!(fx.server.nodes.chk_characteristic(&mut snap, key).unwrap(), WriteGranularity::Full);
    assert!(fx.node("n1").modified.contains(NodeModified::UPDATE_OTHERS));
}

#[test]
fn characteristic_snapshot_is_single_use() {
    let mut fx = fixture();
    let k1 = fx.add_node("n1", 1, &[]);
    let k2 = fx.add_node("n2", 1, &[]);

    let mut snap = fx.server.nodes.save_characteristic(k1).unwrap();
    assert!(matches!(fx.server.nodes.chk_characteristic(&mut snap, k2), Err(Error::CharacteristicMismatch)));
    assert!(matches!(fx.server.nodes.chk_characteristic(&mut snap, k1), Err(Error::CharacteristicMismatch)));
}

#[test]
fn array_stays_dense_after_delete() {
    let mut fx = fixture();
    for name in ["n1", "n2", "n3", "n4", "n5"] {
        fx.add_node(name, 1, &[]);
    }

    let n2 = fx.key("n2");
    fx.server.effective_node_delete(n2).unwrap();

    assert_eq!(fx.server.nodes.len(), 4);
    assert!(fx.server.find_nodebyname("n2").is_none());
    for (index, name) in ["n1", "n3", "n4", "n5"].iter().enumerate() {
        let key = fx.server.nodes.at(index).unwrap();
        let node = fx.server.nodes.get(key).unwrap();
        assert_eq!(node.name.as_str(), *name);
        assert_eq!(node.arr_index, index);
    }
    assert_eq!(fx.server.moms.len(), 4);
}

#[test]
fn creation_errors_leave_nothing_behind() {
    let mut fx = fixture();
    fx.add_node("n1", 1, &[]);

    assert_eq!(fx.server.create_pbs_node("n1", &AttrList::new(), false), Err(PbsError::NodeExist));

    let bad_attr = attrs(&[("no_such_attribute", None, "1")]);
    assert_eq!(fx.server.create_pbs_node("n2", &bad_attr, false), Err(PbsError::UnkNodeAttr));

    let bad_resc = attrs(&[("resources_available", Some("no_such_resource"), "1")]);
    assert_eq!(fx.server.create_pbs_node("n3", &bad_resc, false), Err(PbsError::UnkResc));

    let bad_port = attrs(&[("Port", None, "not-a-port")]);
    assert_eq!(fx.server.create_pbs_node("n4", &bad_port, false), Err(PbsError::BadAtVal));

    assert_eq!(fx.server.nodes.len(), 1);
    assert_eq!(fx.server.moms.len(), 1);
    assert!(fx.server.find_nodebyname("n2").is_none());
}

#[test]
fn recovery_skips_unknown_attributes() {
    let mut fx = fixture();
    let list = attrs(&[("no_such_attribute", None, "1"), ("resources_available", Some("no_such_resource"), "1")]);

    let key = fx.server.create_pbs_node("n1", &list, true).unwrap();

    assert!(fx.server.nodes.get(key).unwrap().available().unwrap().find("no_such_resource").is_none());
}

#[test]
fn read_only_attributes_are_refused_outside_recovery() {
    let mut fx = fixture();
    let key = fx.add_node("n1", 1, &[]);

    assert_eq!(fx.server.set_node_attribute(key, NodeAttr::License, Some("l"), ActionMode::Alter), Err(PbsError::AttrRo));
    assert_eq!(fx.server.set_node_attribute(key, NodeAttr::Mom, Some("other"), ActionMode::Alter), Err(PbsError::AttrRo));
    assert_eq!(fx.server.set_node_attribute(key, NodeAttr::ResourceAvail, Some("x"), ActionMode::Alter), Err(PbsError::AttrType));
}

#[test]
fn deleting_a_natural_vnode_unlinks_its_mom_from_other_vnodes() {
    let mut fx = fixture();
    fx.add_node("host1", 2, &[]);
    let shared = attrs(&[("Mom", None, "host1,host2")]);
    let vkey = fx.server.create_pbs_node("host1[0]", &shared, false).unwrap();

    let host1_mom = fx.server.moms.find("host1", 15002).unwrap();
    assert_eq!(fx.server.moms.get(host1_mom).unwrap().children.len(), 2);
    assert_eq!(fx.server.moms.len(), 2);

    let natural = fx.key("host1");
    fx.server.effective_node_delete(natural).unwrap();

    assert!(fx.server.moms.find("host1", 15002).is_none());
    let vnode = fx.server.nodes.get(vkey).unwrap();
    assert_eq!(vnode.attr(NodeAttr::Mom).as_str_array(), ["host2".to_string()]);
    assert_eq!(vnode.hostname, "host2");
    assert_eq!(vnode.moms.len(), 1);
    assert!(vnode.modified.contains(NodeModified::UPDATE_MOM));
}

#[test]
fn deleting_a_plain_vnode_keeps_the_mom() {
    let mut fx = fixture();
    fx.add_node("host1", 1, &[]);
    let vkey = fx.server.create_pbs_node("host1[0]", &attrs(&[("Mom", None, "host1")]), false).unwrap();

    fx.server.effective_node_delete(vkey).unwrap();

    let mom = fx.server.moms.find("host1", 15002).unwrap();
    assert_eq!(fx.server.moms.get(mom).unwrap().children, vec![fx.key("host1")]);
}

#[test]
fn lookup_ignores_parenthesis_and_subnode_suffix() {
    let mut fx = fixture();
    let key = fx.add_node("n1", 2, &[]);

    assert_eq!(fx.server.find_nodebyname("(n1/0"), Some(key));
    assert_eq!(fx.server.find_nodebyname("n1/1"), Some(key));
    assert_eq!(fx.server.find_nodebyname("n9"), None);
    assert!(!fx.server.is_vnode_up("n1"));
}

#[test]
fn lookup_by_mom_address_gives_natural_vnode() {
    let mut fx = fixture();
    let key = fx.add_node("n1", 1, &[]);
    let mom = fx.server.moms.find("n1", 15002).unwrap();
    fx.server.moms.add_address(mom, 0x0a00_0001);

    assert_eq!(fx.server.find_nodebyaddr(0x0a00_0001), Some(key));
    assert_eq!(fx.server.find_nodebyaddr(0x0a00_0002), None);
}

#[test]
fn queue_association_rules() {
    let mut fx = fixture_with(|config| {
        config.queues.push(Queue::new("workq", QueueType::Execution, None));
        config.queues.push(Queue::new("routeq", QueueType::Route, None));
        config.queues.push(Queue::new("partq", QueueType::Execution, Some("p1".into())));
    });
    let key = fx.add_node("n1", 1, &[]);

    assert_eq!(fx.server.set_node_attribute(key, NodeAttr::Queue, Some("nosuch"), ActionMode::Alter), Err(PbsError::UnkQue));
    assert_eq!(fx.server.set_node_attribute(key, NodeAttr::Queue, Some("routeq"), ActionMode::Alter), Err(PbsError::AttrType));

    fx.server.set_node_attribute(key, NodeAttr::Partition, Some("p2"), ActionMode::Alter).unwrap();
    assert_eq!(fx.server.set_node_attribute(key, NodeAttr::Queue, Some("partq"), ActionMode::Alter), Err(PbsError::PartitionNotInQue));

    fx.server.set_node_attribute(key, NodeAttr::Queue, Some("workq"), ActionMode::Alter).unwrap();
    assert!(fx.server.que_has_nodes);
    assert_eq!(fx.node("n1").pque.as_ref().map(|q| q.as_str()), Some("workq"));

    fx.server.set_node_attribute(key, NodeAttr::Queue, None, ActionMode::Alter).unwrap();
    assert!(!fx.server.que_has_nodes);
    assert!(fx.node("n1").pque.is_none());
}

#[test]
fn setup_notification_marks_everything_down() {
    let mut fx = fixture();
    let key = fx.add_node("n1", 1, &[]);
    fx.server.nodes.get_mut(key).unwrap().clear_state(NodeState::DOWN | NodeState::UNKNOWN);

    fx.server.setup_notification();

    assert!(fx.node("n1").state.contains(NodeState::DOWN));
    let mom = fx.server.moms.find("n1", 15002).unwrap();
    assert!(fx.server.moms.get(mom).unwrap().state.contains(NodeState::NEED_ADDRS));
}
