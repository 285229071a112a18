pub mod actions;
pub mod characteristic;
pub mod create;
pub mod delete;
pub mod indirect;
pub mod maintenance;
pub mod node;
pub mod node_store;
pub mod subnode;
pub mod topology;
