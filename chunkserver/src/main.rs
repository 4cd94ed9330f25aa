use chunkserver::{
    chunk_manager::{ChunkManager, StoreSettings},
    config::CONFIG,
    meta_link::MetaLink,
    service::ChunkService,
};
use std::{sync::Arc, time::Duration};
use utilities::{
    logger::{error, info, init_logger},
    result::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _gaurd = init_logger(
        "Chunkserver",
        "chunkserver_0",
        CONFIG.log_level.clone(),
        &CONFIG.log_base,
    );
    let settings = StoreSettings {
        nodes: CONFIG.nodes,
        chunk_size: CONFIG.chunk_size,
        nodes_per_rack: CONFIG.nodes_per_rack,
        node_capacity: CONFIG.node_capacity,
    };
    let manager = match ChunkManager::new(settings) {
        Ok(v) => Arc::new(v),
        Err(e) => {
            error!(error=%e,"Invalid chunk server configuration hence shutting down");
            return Err(e);
        }
    };
    let meta_link = MetaLink::new(CONFIG.meta_server_addrs.clone());
    info!(port=%CONFIG.port,"Starting the chunk server");
    let service = ChunkService::new(
        format!("0.0.0.0:{}", CONFIG.port),
        manager,
        meta_link,
        Duration::from_secs(CONFIG.idle_timeout_secs),
    )
    .await?;
    service.start_and_accept().await
}
