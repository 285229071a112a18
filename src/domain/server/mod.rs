pub mod config;
pub mod fatal;
pub mod migrate;
pub mod node_db;
pub mod save_nodes;
pub mod server;
pub mod setup_nodes;
