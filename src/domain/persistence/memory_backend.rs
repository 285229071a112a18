use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::attribute::attr_list::AttrList;
use crate::domain::clock::clock::{SharedClock, SystemClock};
use crate::domain::persistence::attr_codec::{attrlist_to_dbarray, dbarray_to_attrlist};
use crate::domain::persistence::backend::{ConnErrCode, DbBackend, DbOutcome};
use crate::domain::persistence::connection::{ConnState, ConnectInfo};
use crate::domain::persistence::db_object::{DbObject, DbObjectType, QUERY_ORDER_BY_INDEX, QueryOptions, SaveType};
use crate::error::DbError;

/// Schema version written by this crate.
pub const SCHEMA_VERSION: (i32, i32) = (3, 0);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRow {
    /// Scalar columns; attribute lists are kept empty here.
    object: DbObject,
    /// Attributes in flattened associative form.
    attrs: Vec<String>,
    seq: u64,
    savetm: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tables {
    rows: BTreeMap<DbObjectType, BTreeMap<String, StoredRow>>,
    next_seq: u64,
    schema: (i32, i32),
    #[serde(skip)]
    cache: HashMap<(DbObjectType, String), AttrList>,
}

impl Default for Tables {
    fn default() -> Self {
        Tables { rows: BTreeMap::new(), next_seq: 0, schema: SCHEMA_VERSION, cache: HashMap::new() }
    }
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    obj_type: DbObjectType,
    remaining_ok: usize,
}

#[derive(Debug)]
struct StoreInner {
    tables: Tables,
    snapshot: Option<Tables>,
    image_path: Option<PathBuf>,
    clock: SharedClock,
    connected: bool,
    refuse_connect: bool,
    fault: Option<Fault>,
}

/// In-process store. Clones share the same tables, so a test can keep a handle
/// while the server owns the connection.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryBackend {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_tables(Tables::default(), None, clock)
    }

    /// Opens a store whose committed state is mirrored to a JSON image at `path`.
    /// An existing image is loaded.
    pub fn open(path: impl AsRef<Path>, clock: SharedClock) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let data = fs::read_to_string(&path).map_err(|e| DbError::Image(format!("{}: {}", path.display(), e)))?;
            serde_json::from_str(&data).map_err(|e| DbError::Image(format!("{}: {}", path.display(), e)))?
        } else {
            Tables::default()
        };
        log::info!("Opened data store image '{}'", path.display());
        Ok(Self::with_tables(tables, Some(path), clock))
    }

    fn with_tables(tables: Tables, image_path: Option<PathBuf>, clock: SharedClock) -> Self {
        let inner = StoreInner { tables, snapshot: None, image_path, clock, connected: false, refuse_connect: false, fault: None };
        MemoryBackend { inner: Arc::new(Mutex::new(inner)) }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("Mutex poisoned")
    }

    pub fn set_schema_version(&self, major: i32, minor: i32) {
        self.lock().tables.schema = (major, minor);
    }

    pub fn set_refuse_connect(&self, refuse: bool) {
        self.lock().refuse_connect = refuse;
    }

    /// Lets `remaining_ok` more saves of `obj_type` succeed, then fails the next one.
    pub fn fail_save_after(&self, obj_type: DbObjectType, remaining_ok: usize) {
        self.lock().fault = Some(Fault { obj_type, remaining_ok });
    }

    pub fn row_count(&self, obj_type: DbObjectType) -> usize {
        self.lock().tables.rows.get(&obj_type).map_or(0, BTreeMap::len)
    }

    pub fn in_transaction(&self) -> bool {
        self.lock().snapshot.is_some()
    }

    /// Every row of `obj_type` in creation order, attributes reconstituted.
    pub fn rows(&self, obj_type: DbObjectType) -> Vec<DbObject> {
        let guard = self.lock();
        let mut rows: Vec<&StoredRow> = guard.tables.rows.get(&obj_type).map(|t| t.values().collect()).unwrap_or_default();
        rows.sort_by_key(|row| row.seq);
        rows.into_iter().filter_map(|row| reconstitute(row, &guard.tables.cache).ok()).collect()
    }
}

fn reconstitute(row: &StoredRow, cache: &HashMap<(DbObjectType, String), AttrList>) -> Result<DbObject, DbError> {
    let mut obj = row.object.clone();
    let attrs = dbarray_to_attrlist(&row.attrs)?;
    let cache_key = (obj.obj_type(), obj.key().to_string());
    if let Some(list) = obj.db_attrs_mut() {
        *list = attrs;
    }
    if let (Some(list), Some(cached)) = (obj.cache_attrs_mut(), cache.get(&cache_key)) {
        *list = cached.clone();
    }
    Ok(obj)
}

/// Splits `obj` into stored scalar columns and flattened attributes.
fn split_object(obj: &DbObject) -> (DbObject, Vec<String>, Option<AttrList>) {
    let mut scalar = obj.clone();
    let attrs = scalar.db_attrs_mut().map(std::mem::take).map(|list| attrlist_to_dbarray(&list)).unwrap_or_default();
    let cache = scalar.cache_attrs_mut().map(std::mem::take).filter(|list| !list.is_empty());
    (scalar, attrs, cache)
}

fn set_timestamps(obj: &mut DbObject, creattm: Option<i64>, savetm: i64) {
    if let DbObject::Node(node) = obj {
        if let Some(creattm) = creattm {
            node.creattm = creattm;
        }
        node.savetm = savetm;
    }
}

impl StoreInner {
    fn in_trx(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Mutations outside a transaction are committed immediately.
    fn autocommit(&mut self) -> Result<(), DbError> {
        if self.in_trx() { Ok(()) } else { self.write_image() }
    }

    fn write_image(&self) -> Result<(), DbError> {
        let Some(path) = &self.image_path else {
            return Ok(());
        };
        let data = serde_json::to_string_pretty(&self.tables).map_err(|e| DbError::Image(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data).map_err(|e| DbError::Image(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, path).map_err(|e| DbError::Image(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    fn check_fault(&mut self, obj: &DbObject) -> Result<(), DbError> {
        let Some(fault) = self.fault.as_mut() else {
            return Ok(());
        };
        if fault.obj_type != obj.obj_type() {
            return Ok(());
        }
        if fault.remaining_ok > 0 {
            fault.remaining_ok -= 1;
            return Ok(());
        }
        self.fault = None;
        Err(DbError::Backend(format!("injected failure saving {:?} '{}'", obj.obj_type(), obj.key())))
    }

    fn require_connected(&self) -> Result<(), DbError> {
        if self.connected { Ok(()) } else { Err(DbError::NotConnected) }
    }
}

impl DbBackend for MemoryBackend {
    fn connect(&mut self, info: &ConnectInfo) -> Result<(), DbError> {
        let mut guard = self.lock();
        if guard.refuse_connect {
            return Err(DbError::ConnectionRefused(info.host.clone()));
        }
        guard.connected = true;
        log::debug!("Connected to in-memory store ({})", info.conn_info);
        Ok(())
    }

    fn connect_async(&mut self, info: &ConnectInfo) -> Result<ConnState, DbError> {
        self.connect(info).map(|_| ConnState::Connected)
    }

    fn disconnect(&mut self) {
        let mut guard = self.lock();
        if let Some(snapshot) = guard.snapshot.take() {
            guard.tables = snapshot;
        }
        guard.connected = false;
    }

    fn prepare_statements(&mut self) -> Result<(), DbError> {
        self.lock().require_connected()
    }

    fn begin(&mut self, _isolation: i32) -> Result<(), DbError> {
        let mut guard = self.lock();
        guard.require_connected()?;
        if guard.in_trx() {
            return Err(DbError::Transaction("transaction already open".to_string()));
        }
        guard.snapshot = Some(guard.tables.clone());
        Ok(())
    }

    fn commit(&mut self, _async_commit: bool) -> Result<(), DbError> {
        let mut guard = self.lock();
        if guard.snapshot.take().is_none() {
            return Err(DbError::Transaction("commit without open transaction".to_string()));
        }
        guard.write_image()
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        let mut guard = self.lock();
        match guard.snapshot.take() {
            Some(snapshot) => {
                guard.tables = snapshot;
                Ok(())
            }
            None => Err(DbError::Transaction("rollback without open transaction".to_string())),
        }
    }

    fn save(&mut self, obj: &DbObject, savetype: SaveType) -> Result<DbOutcome, DbError> {
        let mut guard = self.lock();
        guard.require_connected()?;
        guard.check_fault(obj)?;

        let now = guard.clock.now_s();
        let obj_type = obj.obj_type();
        let key = obj.key().to_string();
        let (mut scalar, attrs, cache) = split_object(obj);
        let seq = guard.tables.next_seq;
        let table = guard.tables.rows.entry(obj_type).or_default();

        match savetype {
            SaveType::Insert => {
                if table.contains_key(&key) {
                    return Err(DbError::DuplicateKey(obj_type, key));
                }
                set_timestamps(&mut scalar, Some(now), now);
                table.insert(key.clone(), StoredRow { object: scalar, attrs, seq, savetm: now });
                guard.tables.next_seq += 1;
            }
            SaveType::UpdateFull | SaveType::UpdateQuick => {
                let Some(row) = table.get_mut(&key) else {
                    return Ok(DbOutcome::NotFound);
                };
                let creattm = match &row.object {
                    DbObject::Node(node) => Some(node.creattm),
                    _ => None,
                };
                set_timestamps(&mut scalar, creattm, now);
                row.object = scalar;
                row.savetm = now;
                if savetype == SaveType::UpdateFull {
                    row.attrs = attrs;
                }
            }
        }

        if let Some(cache) = cache {
            guard.tables.cache.insert((obj_type, key), cache);
        }
        guard.autocommit()?;
        Ok(DbOutcome::Found)
    }

    fn load(&mut self, obj: &mut DbObject) -> Result<DbOutcome, DbError> {
        let guard = self.lock();
        guard.require_connected()?;
        let Some(row) = guard.tables.rows.get(&obj.obj_type()).and_then(|t| t.get(obj.key())) else {
            return Ok(DbOutcome::NotFound);
        };
        *obj = reconstitute(row, &guard.tables.cache)?;
        Ok(DbOutcome::Found)
    }

    fn delete(&mut self, obj: &DbObject) -> Result<DbOutcome, DbError> {
        let mut guard = self.lock();
        guard.require_connected()?;
        let obj_type = obj.obj_type();
        let removed = guard.tables.rows.get_mut(&obj_type).and_then(|t| t.remove(obj.key()));
        if removed.is_none() {
            return Ok(DbOutcome::NotFound);
        }
        guard.tables.cache.remove(&(obj_type, obj.key().to_string()));
        guard.autocommit()?;
        Ok(DbOutcome::Found)
    }

    fn delete_attributes(&mut self, obj_type: DbObjectType, id: &str, attrs: &AttrList) -> Result<DbOutcome, DbError> {
        let mut guard = self.lock();
        guard.require_connected()?;
        let now = guard.clock.now_s();
        let Some(row) = guard.tables.rows.get_mut(&obj_type).and_then(|t| t.get_mut(id)) else {
            return Ok(DbOutcome::NotFound);
        };
        let mut current = dbarray_to_attrlist(&row.attrs)?;
        for entry in attrs.iter() {
            current.remove(&entry.name, entry.resc.as_deref());
        }
        row.attrs = attrlist_to_dbarray(&current);
        row.savetm = now;
        guard.autocommit()?;
        Ok(DbOutcome::Found)
    }

    fn save_attributes(&mut self, obj_type: DbObjectType, id: &str, attrs: &AttrList) -> Result<DbOutcome, DbError> {
        let mut guard = self.lock();
        guard.require_connected()?;
        let now = guard.clock.now_s();
        let Some(row) = guard.tables.rows.get_mut(&obj_type).and_then(|t| t.get_mut(id)) else {
            return Ok(DbOutcome::NotFound);
        };
        let mut current = dbarray_to_attrlist(&row.attrs)?;
        current.extend(attrs);
        row.attrs = attrlist_to_dbarray(&current);
        row.savetm = now;
        guard.autocommit()?;
        Ok(DbOutcome::Found)
    }

    fn query(&mut self, obj_type: DbObjectType, opts: Option<&QueryOptions>) -> Result<Vec<DbObject>, DbError> {
        let guard = self.lock();
        guard.require_connected()?;
        let mut rows: Vec<&StoredRow> = guard.tables.rows.get(&obj_type).map(|t| t.values().collect()).unwrap_or_default();

        if let Some(since) = opts.and_then(|o| o.timestamp) {
            rows.retain(|row| row.savetm >= since);
        }
        rows.sort_by_key(|row| row.seq);
        if opts.is_some_and(|o| o.flags & QUERY_ORDER_BY_INDEX != 0) {
            rows.sort_by_key(|row| match &row.object {
                DbObject::Node(node) => node.nd_index,
                _ => 0,
            });
        }

        rows.into_iter().map(|row| reconstitute(row, &guard.tables.cache)).collect()
    }

    fn truncate_all(&mut self) -> Result<(), DbError> {
        let mut guard = self.lock();
        guard.require_connected()?;
        guard.tables.rows.clear();
        guard.tables.cache.clear();
        guard.autocommit()
    }

    fn schema_version(&mut self) -> Result<(i32, i32), DbError> {
        let guard = self.lock();
        guard.require_connected()?;
        Ok(guard.tables.schema)
    }

    fn write_schema_version(&mut self, major: i32, minor: i32) -> Result<(), DbError> {
        let mut guard = self.lock();
        guard.require_connected()?;
        guard.tables.schema = (major, minor);
        guard.autocommit()
    }

    fn escape_str(&self, s: &str) -> String {
        s.replace('\\', "\\\\").replace('\'', "''")
    }

    fn error_message(&self, code: ConnErrCode) -> String {
        match code {
            ConnErrCode::Success => "Success".to_string(),
            ConnErrCode::ConnRefused => "Connection refused".to_string(),
            ConnErrCode::AuthFailed => "Failed to authenticate to the data store".to_string(),
            ConnErrCode::ConnFailed => "Failed to connect to the data store".to_string(),
            ConnErrCode::NoMem => "Out of memory".to_string(),
            ConnErrCode::StillStarting => "Data store is still starting".to_string(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new(Arc::new(SystemClock))
    }
}
