pub mod attr_codec;
pub mod backend;
pub mod connection;
pub mod db_object;
pub mod memory_backend;
