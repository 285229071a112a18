use crate::domain::attribute::attr_list::AttrList;
use crate::domain::persistence::connection::{ConnState, ConnectInfo};
use crate::domain::persistence::db_object::{DbObject, DbObjectType, QueryOptions, SaveType};
use crate::error::DbError;

/// Result of an operation that may legitimately find no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOutcome {
    Found,
    NotFound,
}

impl DbOutcome {
    /// Legacy return code: 0 success with data, 1 no rows.
    pub fn code(self) -> i32 {
        match self {
            DbOutcome::Found => 0,
            DbOutcome::NotFound => 1,
        }
    }
}

/// Maps a store result onto the 0 / 1 / -1 return-code contract.
pub fn db_code(result: &Result<DbOutcome, DbError>) -> i32 {
    match result {
        Ok(outcome) => outcome.code(),
        Err(_) => -1,
    }
}

/// Connection-level failure classes a backend reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnErrCode {
    Success,
    ConnRefused,
    AuthFailed,
    ConnFailed,
    NoMem,
    StillStarting,
}

/// A storage engine. Every operation is uniform over the object kinds through `DbObject`.
pub trait DbBackend: std::fmt::Debug + Send {
    fn connect(&mut self, info: &ConnectInfo) -> Result<(), DbError>;

    /// One poll step of a non-blocking connect.
    fn connect_async(&mut self, info: &ConnectInfo) -> Result<ConnState, DbError>;

    fn disconnect(&mut self);

    fn prepare_statements(&mut self) -> Result<(), DbError>;

    fn begin(&mut self, isolation: i32) -> Result<(), DbError>;

    fn commit(&mut self, async_commit: bool) -> Result<(), DbError>;

    fn rollback(&mut self) -> Result<(), DbError>;

    fn save(&mut self, obj: &DbObject, savetype: SaveType) -> Result<DbOutcome, DbError>;

    /// Fills `obj` from the row whose key is already present in `obj`.
    fn load(&mut self, obj: &mut DbObject) -> Result<DbOutcome, DbError>;

    fn delete(&mut self, obj: &DbObject) -> Result<DbOutcome, DbError>;

    fn delete_attributes(&mut self, obj_type: DbObjectType, id: &str, attrs: &AttrList) -> Result<DbOutcome, DbError>;

    /// Upserts a subset of attributes without touching the rest of the row.
    fn save_attributes(&mut self, obj_type: DbObjectType, id: &str, attrs: &AttrList) -> Result<DbOutcome, DbError>;

    /// Materializes every row of `obj_type` that passes `opts`.
    fn query(&mut self, obj_type: DbObjectType, opts: Option<&QueryOptions>) -> Result<Vec<DbObject>, DbError>;

    fn truncate_all(&mut self) -> Result<(), DbError>;

    /// `(major, minor)` of the stored schema.
    fn schema_version(&mut self) -> Result<(i32, i32), DbError>;

    /// Records the schema the stored rows now follow. Part of the open transaction, if any.
    fn write_schema_version(&mut self, major: i32, minor: i32) -> Result<(), DbError>;

    fn escape_str(&self, s: &str) -> String;

    fn error_message(&self, code: ConnErrCode) -> String;
}
