use figment::{
    Figment,
    providers::{Format, Serialized, Yaml},
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub port: u16,
    pub meta_server_addrs: String,
    pub nodes: usize,
    pub chunk_size: usize,
    pub nodes_per_rack: usize,
    pub node_capacity: u64,
    pub idle_timeout_secs: u64,
    pub log_level: String,
    pub log_base: String,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8001,
            meta_server_addrs: "127.0.0.1:8000".to_string(),
            nodes: 8,
            chunk_size: 4096,
            nodes_per_rack: 4,
            node_capacity: 1024 * 1024,
            idle_timeout_secs: 300,
            log_level: "info".to_string(),
            log_base: "./temp/chunkserver/".to_string(),
        }
    }
}
pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    let config_file_path = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| format!("./chunkserver/config/{}.yaml", env));
    Figment::new()
        .merge(Serialized::default("default", Config::default()))
        .merge(Yaml::file(config_file_path))
        .extract()
        .unwrap()
});
