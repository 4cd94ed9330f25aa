pub mod envelope;
pub mod frame;
pub mod types;
