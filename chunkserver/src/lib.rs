pub mod chunk_manager;
pub mod config;
pub mod meta_link;
pub mod placement;
pub mod service;
