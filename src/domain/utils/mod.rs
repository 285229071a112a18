pub mod bits;
pub mod id;
