pub mod logger;
pub mod result;
pub mod retry_policy;
