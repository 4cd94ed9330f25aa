use figment::{
    Figment,
    providers::{Format, Serialized, Yaml},
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub meta_server_addrs: String,
    pub chunk_server_addrs: String,
    pub log_level: String,
    pub log_base: String,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            meta_server_addrs: "127.0.0.1:8000".to_string(),
            chunk_server_addrs: "127.0.0.1:8001".to_string(),
            log_level: "warn".to_string(),
            log_base: "./temp/client/".to_string(),
        }
    }
}
pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    let config_file_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| format!("./client/config/{}.yaml", env));
    Figment::new()
        .merge(Serialized::default("default", Config::default()))
        .merge(Yaml::file(config_file_path))
        .extract()
        .unwrap()
});
