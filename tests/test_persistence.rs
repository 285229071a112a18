use std::sync::Arc;

use pbs_server_core::domain::attribute::attr_list::AttrList;
use pbs_server_core::domain::attribute::flags::AttrFlags;
use pbs_server_core::domain::clock::clock_mock::MockClock;
use pbs_server_core::domain::persistence::backend::{DbBackend, DbOutcome, db_code};
use pbs_server_core::domain::persistence::connection::{ConnState, DbConnection, TrxEnd};
use pbs_server_core::domain::persistence::db_object::{
    DbNodeInfo, DbObject, DbObjectType, DbSchedInfo, QUERY_ORDER_BY_INDEX, QueryOptions, SaveType,
};
use pbs_server_core::domain::persistence::memory_backend::MemoryBackend;
use pbs_server_core::error::DbError;

fn connected(clock: &MockClock) -> (DbConnection, MemoryBackend) {
    let store = MemoryBackend::new(Arc::new(clock.clone()));
    let mut conn = DbConnection::init(Box::new(store.clone()), "localhost", 5);
    conn.connect().unwrap();
    conn.prepare_statements().unwrap();
    (conn, store)
}

fn node_row(name: &str, index: i64) -> DbObject {
    let mut attrs = AttrList::new();
    attrs.add("resources_available", Some("ncpus"), "2", AttrFlags::SET);
    attrs.add("Mom", None, name, AttrFlags::SET);
    DbObject::Node(DbNodeInfo { nd_name: name.to_string(), nd_index: index, nd_hostname: name.to_string(), db_attr_list: attrs, ..Default::default() })
}

fn load_node(conn: &mut DbConnection, name: &str) -> Option<DbNodeInfo> {
    let mut obj = DbObject::Node(DbNodeInfo { nd_name: name.to_string(), ..Default::default() });
    match (conn.load_obj(&mut obj).unwrap(), obj) {
        (DbOutcome::Found, DbObject::Node(row)) => Some(row),
        _ => None,
    }
}

#[test]
fn insert_load_and_delete() {
    let clock = MockClock::new(100);
    let (mut conn, _) = connected(&clock);

    assert_eq!(conn.save_obj(&node_row("n1", 0), SaveType::Insert).unwrap(), DbOutcome::Found);
    let row = load_node(&mut conn, "n1").unwrap();
    assert_eq!(row.nd_hostname, "n1");
    assert_eq!(row.creattm, 100);
    assert_eq!(row.db_attr_list.find("resources_available", Some("ncpus")).unwrap().value, "2");

    assert_eq!(conn.delete_obj(&node_row("n1", 0)).unwrap(), DbOutcome::Found);
    assert!(load_node(&mut conn, "n1").is_none());
    assert_eq!(conn.delete_obj(&node_row("n1", 0)).unwrap(), DbOutcome::NotFound);
}

#[test]
fn return_codes_follow_the_legacy_contract() {
    let clock = MockClock::new(100);
    let (mut conn, _) = connected(&clock);

    let found = conn.save_obj(&node_row("n1", 0), SaveType::Insert);
    assert_eq!(db_code(&found), 0);
    let missing = conn.save_obj(&node_row("n2", 1), SaveType::UpdateFull);
    assert_eq!(db_code(&missing), 1);
    let duplicate = conn.save_obj(&node_row("n1", 0), SaveType::Insert);
    assert_eq!(db_code(&duplicate), -1);
    assert_eq!(duplicate, Err(DbError::DuplicateKey(DbObjectType::Node, "n1".to_string())));
    assert!(conn.last_error().unwrap().contains("Duplicate key"));
}

#[test]
fn quick_update_keeps_attributes() {
    let clock = MockClock::new(100);
    let (mut conn, _) = connected(&clock);
    conn.save_obj(&node_row("n1", 0), SaveType::Insert).unwrap();

    clock.advance(5);
    let quick = DbObject::Node(DbNodeInfo { nd_name: "n1".into(), nd_state: 1, ..Default::default() });
    conn.save_obj(&quick, SaveType::UpdateQuick).unwrap();

    let row = load_node(&mut conn, "n1").unwrap();
    assert_eq!(row.nd_state, 1);
    assert_eq!(row.creattm, 100);
    assert_eq!(row.savetm, 105);
    assert!(row.db_attr_list.find("Mom", None).is_some());
}

#[test]
fn nested_rollback_discards_the_whole_transaction() {
    let clock = MockClock::new(100);
    let (mut conn, store) = connected(&clock);
    conn.save_obj(&node_row("keep", 0), SaveType::Insert).unwrap();

    conn.begin_trx(0, false).unwrap();
    conn.save_obj(&node_row("n1", 1), SaveType::Insert).unwrap();
    conn.begin_trx(0, false).unwrap();
    assert_eq!(conn.trx_nest(), 2);
    conn.save_obj(&node_row("n2", 2), SaveType::Insert).unwrap();
    conn.end_trx(TrxEnd::Rollback).unwrap();
    assert!(store.in_transaction());
    conn.end_trx(TrxEnd::Commit).unwrap();

    assert!(!store.in_transaction());
    assert_eq!(conn.trx_nest(), 0);
    assert_eq!(store.row_count(DbObjectType::Node), 1);
    assert!(load_node(&mut conn, "keep").is_some());
}

#[test]
fn nested_commit_reaches_the_store_once() {
    let clock = MockClock::new(100);
    let (mut conn, store) = connected(&clock);

    conn.begin_trx(0, true).unwrap();
    conn.begin_trx(0, false).unwrap();
    conn.save_obj(&node_row("n1", 0), SaveType::Insert).unwrap();
    conn.end_trx(TrxEnd::Commit).unwrap();
    assert!(store.in_transaction());
    conn.end_trx(TrxEnd::Commit).unwrap();

    assert!(!store.in_transaction());
    assert_eq!(store.row_count(DbObjectType::Node), 1);
}

#[test]
fn end_without_begin_is_refused() {
    let clock = MockClock::new(100);
    let (mut conn, _) = connected(&clock);

    assert!(matches!(conn.end_trx(TrxEnd::Commit), Err(DbError::Transaction(_))));
    assert_eq!(conn.trx_nest(), 0);
}

#[test]
fn cursor_orders_by_index_and_filters_by_time() {
    let clock = MockClock::new(100);
    let (mut conn, _) = connected(&clock);
    conn.save_obj(&node_row("c", 2), SaveType::Insert).unwrap();
    conn.save_obj(&node_row("a", 0), SaveType::Insert).unwrap();
    clock.advance(10);
    conn.save_obj(&node_row("b", 1), SaveType::Insert).unwrap();

    let names = |conn: &mut DbConnection, opts: Option<&QueryOptions>| {
        let mut cursor = conn.cursor_init(DbObjectType::Node, opts).unwrap();
        let mut names = Vec::new();
        while let Some(obj) = conn.cursor_next(&mut cursor).unwrap() {
            names.push(obj.key().to_string());
        }
        conn.cursor_close(cursor);
        names
    };

    assert_eq!(names(&mut conn, None), vec!["c", "a", "b"]);
    let by_index = QueryOptions { flags: QUERY_ORDER_BY_INDEX, timestamp: None };
    assert_eq!(names(&mut conn, Some(&by_index)), vec!["a", "b", "c"]);
    let recent = QueryOptions { flags: QUERY_ORDER_BY_INDEX, timestamp: Some(110) };
    assert_eq!(names(&mut conn, Some(&recent)), vec!["b"]);
}

#[test]
fn attribute_level_save_and_delete() {
    let clock = MockClock::new(100);
    let (mut conn, _) = connected(&clock);
    conn.save_obj(&node_row("n1", 0), SaveType::Insert).unwrap();

    let mut comment = AttrList::new();
    comment.add("comment", None, "bad fan", AttrFlags::SET);
    assert_eq!(conn.save_attr_obj(DbObjectType::Node, "n1", &comment).unwrap(), DbOutcome::Found);
    let row = load_node(&mut conn, "n1").unwrap();
    assert_eq!(row.db_attr_list.find("comment", None).unwrap().value, "bad fan");
    assert_eq!(row.db_attr_list.len(), 3);

    assert_eq!(conn.delete_attr_obj(DbObjectType::Node, "n1", &comment).unwrap(), DbOutcome::Found);
    let row = load_node(&mut conn, "n1").unwrap();
    assert!(row.db_attr_list.find("comment", None).is_none());

    assert_eq!(conn.save_attr_obj(DbObjectType::Node, "ghost", &comment).unwrap(), DbOutcome::NotFound);
}

#[test]
fn other_object_kinds_share_the_interface() {
    let clock = MockClock::new(100);
    let (mut conn, store) = connected(&clock);
    let sched = DbObject::Sched(DbSchedInfo { sched_name: "default".into(), ..Default::default() });

    conn.save_obj(&sched, SaveType::Insert).unwrap();
    assert_eq!(store.row_count(DbObjectType::Sched), 1);
    conn.truncate_all().unwrap();
    assert_eq!(store.row_count(DbObjectType::Sched), 0);
}

#[test]
fn refused_and_missing_connections() {
    let clock = MockClock::new(100);
    let store = MemoryBackend::new(Arc::new(clock.clone()));
    store.set_refuse_connect(true);
    let mut conn = DbConnection::init(Box::new(store.clone()), "dbhost", 5);

    assert_eq!(conn.save_obj(&node_row("n1", 0), SaveType::Insert), Err(DbError::NotConnected));
    assert_eq!(conn.connect(), Err(DbError::ConnectionRefused("dbhost".into())));
    assert_eq!(conn.state(), ConnState::Failed);

    store.set_refuse_connect(false);
    assert_eq!(conn.connect_async().unwrap(), ConnState::Connected);
    assert_eq!(conn.schema_version().unwrap(), (3, 0));
    conn.disconnect();
    assert_eq!(conn.state(), ConnState::NotConnected);
}

#[test]
fn disconnect_rolls_back_an_open_transaction() {
    let clock = MockClock::new(100);
    let (mut conn, store) = connected(&clock);

    conn.begin_trx(0, false).unwrap();
    conn.save_obj(&node_row("n1", 0), SaveType::Insert).unwrap();
    conn.disconnect();

    assert!(!store.in_transaction());
    assert_eq!(store.row_count(DbObjectType::Node), 0);
}

#[test]
fn failed_rollback_on_disconnect_is_recorded() {
    let clock = MockClock::new(100);
    let (mut conn, store) = connected(&clock);

    conn.begin_trx(0, false).unwrap();
    conn.save_obj(&node_row("n1", 0), SaveType::Insert).unwrap();
    let mut other = store.clone();
    other.commit(false).unwrap();
    conn.disconnect();

    assert_eq!(conn.state(), ConnState::NotConnected);
    assert!(conn.last_error().unwrap().contains("rollback without open transaction"));
    assert_eq!(store.row_count(DbObjectType::Node), 1);
}

#[test]
fn committed_state_survives_reopening_the_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("datastore.json");
    let clock = MockClock::new(100);

    {
        let store = MemoryBackend::open(&path, Arc::new(clock.clone())).unwrap();
        let mut conn = DbConnection::init(Box::new(store), "localhost", 5);
        conn.connect().unwrap();
        conn.save_obj(&node_row("n1", 0), SaveType::Insert).unwrap();
        conn.begin_trx(0, false).unwrap();
        conn.save_obj(&node_row("n2", 1), SaveType::Insert).unwrap();
        conn.end_trx(TrxEnd::Rollback).unwrap();
    }

    let store = MemoryBackend::open(&path, Arc::new(clock.clone())).unwrap();
    let mut conn = DbConnection::init(Box::new(store.clone()), "localhost", 5);
    conn.connect().unwrap();
    assert_eq!(store.row_count(DbObjectType::Node), 1);
    let row = load_node(&mut conn, "n1").unwrap();
    assert_eq!(row.db_attr_list.find("Mom", None).unwrap().value, "n1");
}
