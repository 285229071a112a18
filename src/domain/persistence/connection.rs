use std::collections::VecDeque;

use crate::domain::attribute::attr_list::AttrList;
use crate::domain::persistence::backend::{ConnErrCode, DbBackend, DbOutcome};
use crate::domain::persistence::db_object::{DbObject, DbObjectType, QueryOptions, SaveType};
use crate::error::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    NotConnected,
    Connecting,
    Connected,
    Failed,
}

/// How the matching `end_trx` finishes its level of the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxEnd {
    Commit,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub host: String,
    /// Seconds the backend may spend establishing the connection.
    pub timeout: u64,
    /// Backend specific connect string, built by `DbConnection::init`.
    pub conn_info: String,
}

/// Rows produced by `cursor_init`, consumed with `cursor_next`.
#[derive(Debug)]
pub struct DbCursor {
    obj_type: DbObjectType,
    rows: VecDeque<DbObject>,
}

impl DbCursor {
    pub fn obj_type(&self) -> DbObjectType {
        self.obj_type
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

/// A store connection. One connection carries at most one transaction at a time;
/// begin/end pairs nest and only the outermost end reaches the backend.
#[derive(Debug)]
pub struct DbConnection {
    backend: Box<dyn DbBackend>,
    info: ConnectInfo,
    state: ConnState,
    trx_nest: u32,
    trx_rollback: bool,
    trx_async: bool,
    db_err: Option<String>,
}

impl DbConnection {
    /// Prepares connection parameters. Does not connect.
    pub fn init(backend: Box<dyn DbBackend>, host: &str, timeout: u64) -> Self {
        let conn_info = format!("host={} connect_timeout={}", host, timeout);
        DbConnection {
            backend,
            info: ConnectInfo { host: host.to_string(), timeout, conn_info },
            state: ConnState::NotConnected,
            trx_nest: 0,
            trx_rollback: false,
            trx_async: false,
            db_err: None,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn trx_nest(&self) -> u32 {
        self.trx_nest
    }

    /// Text of the most recent failure reported through this connection.
    pub fn last_error(&self) -> Option<&str> {
        self.db_err.as_deref()
    }

    pub fn connect(&mut self) -> Result<(), DbError> {
        let result = self.backend.connect(&self.info);
        self.state = if result.is_ok() { ConnState::Connected } else { ConnState::Failed };
        self.track(result)
    }

    /// Polls a non-blocking connect; call until the state is `Connected` or `Failed`.
    pub fn connect_async(&mut self) -> Result<ConnState, DbError> {
        let result = self.backend.connect_async(&self.info);
        self.state = match &result {
            Ok(state) => *state,
            Err(_) => ConnState::Failed,
        };
        self.track(result)
    }

    pub fn disconnect(&mut self) {
        if self.state == ConnState::Connected && self.trx_nest > 0 {
            log::warn!("Disconnecting with {} open transaction level(s), rolling back", self.trx_nest);
            if let Err(e) = self.backend.rollback() {
                log::error!("rollback on disconnect failed: {}", e);
                self.db_err = Some(e.to_string());
            }
        }
        self.backend.disconnect();
        self.state = ConnState::NotConnected;
        self.trx_nest = 0;
        self.trx_rollback = false;
        self.trx_async = false;
    }

    pub fn prepare_statements(&mut self) -> Result<(), DbError> {
        self.ensure_connected()?;
        let result = self.backend.prepare_statements();
        self.track(result)
    }

    /// Opens a transaction level. `async_commit` applies to the outermost commit only
    /// and is forgotten once that transaction ends.
    pub fn begin_trx(&mut self, isolation: i32, async_commit: bool) -> Result<(), DbError> {
        self.ensure_connected()?;
        if self.trx_nest == 0 {
            let result = self.backend.begin(isolation);
            self.track(result)?;
        }
        self.trx_nest += 1;
        if async_commit {
            self.trx_async = true;
        }
        Ok(())
    }

    /// Closes a transaction level. A rollback at any level makes the outermost end roll back.
    pub fn end_trx(&mut self, end: TrxEnd) -> Result<(), DbError> {
        if self.trx_nest == 0 {
            let err = DbError::Transaction("end_trx without matching begin_trx".to_string());
            return self.track(Err(err));
        }
        if end == TrxEnd::Rollback {
            self.trx_rollback = true;
        }
        self.trx_nest -= 1;
        if self.trx_nest > 0 {
            return Ok(());
        }

        let result = if self.trx_rollback { self.backend.rollback() } else { self.backend.commit(self.trx_async) };
        self.trx_rollback = false;
        self.trx_async = false;
        self.track(result)
    }

    pub fn save_obj(&mut self, obj: &DbObject, savetype: SaveType) -> Result<DbOutcome, DbError> {
        self.ensure_connected()?;
        let result = self.backend.save(obj, savetype);
        self.track(result)
    }

    pub fn load_obj(&mut self, obj: &mut DbObject) -> Result<DbOutcome, DbError> {
        self.ensure_connected()?;
        let result = self.backend.load(obj);
        self.track(result)
    }

    pub fn delete_obj(&mut self, obj: &DbObject) -> Result<DbOutcome, DbError> {
        self.ensure_connected()?;
        let result = self.backend.delete(obj);
        self.track(result)
    }

    pub fn delete_attr_obj(&mut self, obj_type: DbObjectType, id: &str, attrs: &AttrList) -> Result<DbOutcome, DbError> {
        self.ensure_connected()?;
        let result = self.backend.delete_attributes(obj_type, id, attrs);
        self.track(result)
    }

    pub fn save_attr_obj(&mut self, obj_type: DbObjectType, id: &str, attrs: &AttrList) -> Result<DbOutcome, DbError> {
        self.ensure_connected()?;
        let result = self.backend.save_attributes(obj_type, id, attrs);
        self.track(result)
    }

    pub fn cursor_init(&mut self, obj_type: DbObjectType, opts: Option<&QueryOptions>) -> Result<DbCursor, DbError> {
        self.ensure_connected()?;
        let result = self.backend.query(obj_type, opts);
        let rows = self.track(result)?;
        Ok(DbCursor { obj_type, rows: rows.into() })
    }

    /// Next row, or `None` once the cursor is exhausted.
    pub fn cursor_next(&mut self, cursor: &mut DbCursor) -> Result<Option<DbObject>, DbError> {
        self.ensure_connected()?;
        Ok(cursor.rows.pop_front())
    }

    pub fn cursor_close(&mut self, cursor: DbCursor) {
        if !cursor.rows.is_empty() {
            log::trace!("Closing {:?} cursor with {} unread row(s)", cursor.obj_type, cursor.rows.len());
        }
    }

    pub fn truncate_all(&mut self) -> Result<(), DbError> {
        self.ensure_connected()?;
        let result = self.backend.truncate_all();
        self.track(result)
    }

    pub fn schema_version(&mut self) -> Result<(i32, i32), DbError> {
        self.ensure_connected()?;
        let result = self.backend.schema_version();
        self.track(result)
    }

    pub fn write_schema_version(&mut self, major: i32, minor: i32) -> Result<(), DbError> {
        self.ensure_connected()?;
        let result = self.backend.write_schema_version(major, minor);
        self.track(result)
    }

    pub fn escape_str(&self, s: &str) -> String {
        self.backend.escape_str(s)
    }

    pub fn error_message(&self, code: ConnErrCode) -> String {
        self.backend.error_message(code)
    }

    fn ensure_connected(&mut self) -> Result<(), DbError> {
        if self.state == ConnState::Connected {
            return Ok(());
        }
        self.track(Err(DbError::NotConnected))
    }

    fn track<T>(&mut self, result: Result<T, DbError>) -> Result<T, DbError> {
        if let Err(err) = &result {
            self.db_err = Some(err.to_string());
        }
        result
    }
}
