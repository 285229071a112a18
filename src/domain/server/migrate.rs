use std::fs;
use std::path::Path;

use crate::domain::node::node::NodeModified;
use crate::domain::persistence::connection::TrxEnd;
use crate::domain::persistence::memory_backend::SCHEMA_VERSION;
use crate::domain::server::server::Server;
use crate::error::{Error, Result};

pub const NODES_FILE: &str = "nodes";
pub const NODE_STATE_FILE: &str = "node_state";
const MIGRATED_SUFFIX: &str = "migrated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nodes were read from the legacy files and written to the store.
    FromFilesystem { nodes: usize },
    /// An old store was read and every node saved again in the current layout.
    Upgraded { nodes: usize },
    UpToDate,
}

fn retire(path: &Path) {
    if !path.exists() {
        return;
    }
    let target = path.with_extension(MIGRATED_SUFFIX);
    match fs::rename(path, &target) {
        Ok(()) => log::info!("renamed {} to {}", path.display(), target.display()),
        Err(e) => log::warn!("could not rename {}: {}", path.display(), e),
    }
}

impl Server {
    /// Brings the node data into the current store layout.
    ///
    /// A legacy `nodes` file in server_priv takes precedence; it is loaded and saved in a
    /// single transaction and renamed once committed. Otherwise the store's schema version
    /// decides: 1.0 is recovered and re-saved, 3.0 needs nothing, anything else is refused.
    pub fn svr_migrate_data(&mut self) -> Result<MigrationOutcome> {
        let nodes_path = self.server_priv().join(NODES_FILE);
        if nodes_path.exists() {
            let state_path = self.server_priv().join(NODE_STATE_FILE);
            let nodes = self.migrate_from_filesystem(&nodes_path, &state_path)?;
            return Ok(MigrationOutcome::FromFilesystem { nodes });
        }

        let (major, minor) = self.conn.schema_version()?;
        match (major, minor) {
            (1, 0) => {
                let nodes = self.upgrade_store()?;
                log::info!("Upgraded {} node(s) from datastore version {}.{}", nodes, major, minor);
                Ok(MigrationOutcome::Upgraded { nodes })
            }
            (3, 0) => {
                log::info!("Datastore version {}.{} is current, nothing to migrate", major, minor);
                Ok(MigrationOutcome::UpToDate)
            }
            _ => {
                log::error!("Cannot upgrade PBS datastore version {}.{}", major, minor);
                Err(Error::UnsupportedSchema { major, minor })
            }
        }
    }

    /// Recovers and re-saves every node, then stamps the current schema, all in one transaction.
    fn upgrade_store(&mut self) -> Result<usize> {
        self.conn.begin_trx(0, false)?;
        let result = self.setup_nodes().and_then(|nodes| {
            if nodes > 0 {
                for key in self.nodes.keys() {
                    if let Some(node) = self.nodes.get_mut(key) {
                        node.modified.insert(NodeModified::UPDATE_OTHERS);
                    }
                }
                self.save_nodes_db(false, None)?;
            }
            let (major, minor) = SCHEMA_VERSION;
            self.conn.write_schema_version(major, minor)?;
            Ok(nodes)
        });
        match result {
            Ok(nodes) => {
                self.conn.end_trx(TrxEnd::Commit)?;
                Ok(nodes)
            }
            Err(e) => {
                if let Err(rb) = self.conn.end_trx(TrxEnd::Rollback) {
                    log::error!("rollback of datastore upgrade failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    fn migrate_from_filesystem(&mut self, nodes_path: &Path, state_path: &Path) -> Result<usize> {
        self.conn.begin_trx(0, false)?;
        let result = self.setup_nodes_fs(nodes_path, state_path).and_then(|nodes| {
            if nodes > 0 {
                self.save_nodes_db(true, None)?;
            }
            Ok(nodes)
        });
        match result {
            Ok(nodes) => {
                self.conn.end_trx(TrxEnd::Commit)?;
                retire(nodes_path);
                retire(state_path);
                log::info!("Migrated {} node(s) from {}", nodes, nodes_path.display());
                Ok(nodes)
            }
            Err(e) => {
                if let Err(rb) = self.conn.end_trx(TrxEnd::Rollback) {
                    log::error!("rollback of node migration failed: {}", rb);
                }
                Err(e)
            }
        }
    }
}
