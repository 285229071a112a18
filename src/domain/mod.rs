pub mod attribute;
pub mod clock;
pub mod license;
pub mod mom;
pub mod node;
pub mod persistence;
pub mod queue;
pub mod scheduler;
pub mod server;
pub mod shard;
pub mod utils;
pub mod work_task;
