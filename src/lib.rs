use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::server_config_dto::ServerConfigDto;
use crate::domain::clock::clock::{SharedClock, SystemClock};
use crate::domain::persistence::backend::DbBackend;
use crate::domain::persistence::memory_backend::MemoryBackend;
use crate::domain::server::config::ServerConfig;
use crate::domain::server::server::Server;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Reads the server configuration at `file_path`, opens the store and connects.
///
/// `store_override` replaces the configured store image path. Without any path the store
/// lives in memory only.
pub fn open_server(file_path: &Path, store_override: Option<PathBuf>) -> Result<Server> {
    let config_dto = parse_json_file::<ServerConfigDto>(file_path)?;
    let mut config = ServerConfig::try_from(config_dto)?;
    log::info!("Server configuration '{}' parsed successfully.", file_path.display());

    if store_override.is_some() {
        config.database.store_path = store_override;
    }

    let clock: SharedClock = Arc::new(SystemClock);
    let backend: Box<dyn DbBackend> = match &config.database.store_path {
        Some(path) => Box::new(MemoryBackend::open(path, clock.clone())?),
        None => Box::new(MemoryBackend::new(clock.clone())),
    };

    let mut server = Server::new(config, backend, clock);
    server.connect()?;
    Ok(server)
}
