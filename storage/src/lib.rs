pub mod data_node;
pub mod memory_node;
