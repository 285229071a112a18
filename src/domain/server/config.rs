use std::path::PathBuf;

use crate::api::server_config_dto::ServerConfigDto;
use crate::domain::attribute::resource::{ResourceDef, ResourceDefFlags, ResourceDefs};
use crate::domain::queue::queue::Queue;
use crate::domain::shard::shard::ServerInstance;
use crate::error::ConversionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub timeout: u64,
    /// Durable image of the store; in-memory only when absent.
    pub store_path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig { host: "localhost".to_string(), timeout: 30, store_path: None }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_name: String,
    pub pbs_home: PathBuf,
    pub max_servers: i32,
    pub servers: Vec<ServerInstance>,
    pub max_seq_id: i64,
    pub node_group_key: Option<String>,
    pub defs: ResourceDefs,
    pub queues: Vec<Queue>,
    pub sockets_available: i64,
    pub nodes_licensing: bool,
    pub database: DatabaseConfig,
}

impl ServerConfig {
    /// Single server with the built-in resources and no queues.
    pub fn new(server_name: impl Into<String>, pbs_home: impl Into<PathBuf>) -> Self {
        ServerConfig {
            server_name: server_name.into(),
            pbs_home: pbs_home.into(),
            max_servers: 1,
            servers: Vec::new(),
            max_seq_id: 9_999_999,
            node_group_key: None,
            defs: ResourceDefs::builtin(),
            queues: Vec::new(),
            sockets_available: 0,
            nodes_licensing: false,
            database: DatabaseConfig::default(),
        }
    }

    pub fn server_priv(&self) -> PathBuf {
        self.pbs_home.join("server_priv")
    }
}

impl TryFrom<ServerConfigDto> for ServerConfig {
    type Error = ConversionError;

    fn try_from(dto: ServerConfigDto) -> Result<Self, Self::Error> {
        if dto.server_name.trim().is_empty() {
            return Err(ConversionError::InvalidServerConfig("serverName must not be empty".to_string()));
        }
        if dto.max_servers <= 0 {
            return Err(ConversionError::InvalidServerConfig(format!("maxServers must be positive, got {}", dto.max_servers)));
        }

        let mut defs = ResourceDefs::builtin();
        for resc in &dto.resources {
            let rtype = resc.typ.parse()?;
            let flags = ResourceDefFlags::parse(&resc.flags, &resc.name)?;
            defs.add(ResourceDef::new(resc.name.clone(), rtype, flags));
        }

        let queues = dto
            .queues
            .iter()
            .map(|q| Ok(Queue::new(q.name.clone(), q.queue_type.parse()?, q.partition.clone())))
            .collect::<Result<Vec<_>, ConversionError>>()?;

        let servers = dto.servers.iter().map(|s| ServerInstance { hostname: s.hostname.clone(), port: s.port }).collect();

        Ok(ServerConfig {
            server_name: dto.server_name,
            pbs_home: PathBuf::from(dto.pbs_home),
            max_servers: dto.max_servers,
            servers,
            max_seq_id: dto.max_seq_id,
            node_group_key: dto.node_group_key,
            defs,
            queues,
            sockets_available: dto.licenses.sockets_available,
            nodes_licensing: dto.licenses.nodes_available,
            database: DatabaseConfig {
                host: dto.database.host,
                timeout: dto.database.timeout,
                store_path: dto.database.store_path.map(PathBuf::from),
            },
        })
    }
}
