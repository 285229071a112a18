pub mod nodes_file;
pub mod parser;
