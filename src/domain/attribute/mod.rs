pub mod attr_list;
pub mod flags;
pub mod resource;
pub mod value;
