use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfigDto {
    pub server_name: String,
    pub pbs_home: String,
    #[serde(default = "default_max_servers")]
    pub max_servers: i32,
    #[serde(default)]
    pub servers: Vec<ServerInstanceDto>,
    #[serde(default = "default_max_seq_id")]
    pub max_seq_id: i64,
    #[serde(default)]
    pub node_group_key: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceDefDto>,
    #[serde(default)]
    pub queues: Vec<QueueDto>,
    #[serde(default)]
    pub licenses: LicenseDto,
    #[serde(default)]
    pub database: DatabaseDto,
}

fn default_max_servers() -> i32 {
    1
}

fn default_max_seq_id() -> i64 {
    9_999_999
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInstanceDto {
    pub hostname: String,
    pub port: i32,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefDto {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub flags: String,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDto {
    pub name: String,
    pub queue_type: String,
    #[serde(default)]
    pub partition: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LicenseDto {
    #[serde(default)]
    pub sockets_available: i64,
    #[serde(default)]
    pub nodes_available: bool,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseDto {
    pub host: String,
    pub timeout: u64,
    #[serde(default)]
    pub store_path: Option<String>,
}

impl Default for DatabaseDto {
    fn default() -> Self {
        DatabaseDto { host: "localhost".to_string(), timeout: 30, store_path: None }
    }
}
