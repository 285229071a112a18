pub mod ffi;
pub mod shard;
