pub mod chunk_link;
pub mod config;
pub mod metadata_index;
pub mod service;
