use thiserror::Error;

use crate::domain::persistence::db_object::DbObjectType;

/// Reason codes returned to the originator of a rejected node request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PbsError {
    #[error("System error")]
    System,

    #[error("Illegal attribute or resource value")]
    BadAtVal,

    #[error("Unknown node")]
    UnkNode,

    #[error("Node name already exists")]
    NodeExist,

    #[error("Unknown node-attribute")]
    UnkNodeAttr,

    #[error("Unknown resource")]
    UnkResc,

    #[error("Unknown queue")]
    UnkQue,

    #[error("Invalid request")]
    IvalReq,

    #[error("Internal server error occurred")]
    Internal,

    #[error("Cannot set attribute, read only or insufficient permission")]
    AttrRo,

    #[error("Incorrect attribute or resource type")]
    AttrType,

    #[error("Request invalid for state of job")]
    BadState,

    #[error("Resume request is not valid for a job that was not suspended by an admin")]
    WrongResume,

    #[error("Cannot modify attribute while vnode is provisioning")]
    NodeProvNoAction,

    #[error("Cannot set provisioning attribute on host running PBS server and scheduler")]
    ProvHeadError,

    #[error("Request is invalid for an object that is busy")]
    ObjBusy,

    #[error("Invalid indirect resource {0}: target is itself indirect or a target")]
    IndirectHop(String),

    #[error("Invalid indirect resource {0}: target resource does not exist")]
    IndirectBt(String),

    #[error("Partition of the queue does not match the partition of the node")]
    PartitionNotInQue,

    #[error("Node is associated with a queue that is not in this partition")]
    QueNotInPartition,
}

/// Failures raised by a store connection or backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("Connection to the data store is not established")]
    NotConnected,

    #[error("Connection refused by data store at '{0}'")]
    ConnectionRefused(String),

    #[error("Duplicate key for {0:?} object '{1}'")]
    DuplicateKey(DbObjectType, String),

    #[error("Transaction protocol misuse: {0}")]
    Transaction(String),

    #[error("Malformed attribute array: {0}")]
    Codec(String),

    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Failed to write data store image: {0}")]
    Image(String),
}

/// Errors encountered while reading the legacy flat-file node description.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodesFileError {
    #[error("line {line}: invalid \"nodes\" version")]
    InvalidVersion { line: usize },

    #[error("line {line}: invalid node name '{name}'")]
    InvalidNodeName { line: usize, name: String },

    #[error("line {line}: invalid token '{token}'")]
    InvalidToken { line: usize, token: String },

    #[error("line {line}: invalid sharing value '{value}'")]
    InvalidSharing { line: usize, value: String },

    #[error("line {line}: invalid $modtime header '{value}'")]
    InvalidModtime { line: usize, value: String },

    #[error("line {line}: duplicate node '{name}'")]
    DuplicateNode { line: usize, name: String },

    #[error("line {line}: resource '{name}' exists with a non boolean type")]
    PropertyNotBoolean { line: usize, name: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("Unknown resource flag '{0}' on resource '{1}'")]
    UnknownResourceFlag(char, String),

    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Failed to build server configuration: {0}")]
    ConversionError(#[from] ConversionError),

    #[error("Request rejected: {0}")]
    Request(#[from] PbsError),

    #[error("Data store error: {0}")]
    Db(#[from] DbError),

    #[error("Nodes file error: {0}")]
    NodesFile(#[from] NodesFileError),

    #[error("Characteristic check called without a matching snapshot")]
    CharacteristicMismatch,

    #[error("Server has empty nodes list")]
    EmptyNodeList,

    #[error("Unable to save node data base: {0}")]
    PersistenceFailure(String),

    #[error("Cannot upgrade from PBS datastore version {major}.{minor}")]
    UnsupportedSchema { major: i32, minor: i32 },
}

pub type Result<T> = std::result::Result<T, Error>;
