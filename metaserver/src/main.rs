use metaserver::{
    chunk_link::ChunkLink, config::CONFIG, metadata_index::MetadataIndex, service::MetaService,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use utilities::{
    logger::{error, info, init_logger},
    result::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _gaurd = init_logger(
        "Metaserver",
        "metaserver_0",
        CONFIG.log_level.clone(),
        &CONFIG.log_base,
    );
    let index = Arc::new(Mutex::new(MetadataIndex::new(CONFIG.nodes)));
    let chunk_link = ChunkLink::new(CONFIG.chunk_server_addrs.clone());
    info!(port=%CONFIG.port,chunk_server=%CONFIG.chunk_server_addrs,"Starting the metadata server");
    let service = MetaService::new(
        format!("0.0.0.0:{}", CONFIG.port),
        index,
        chunk_link,
        Duration::from_secs(CONFIG.idle_timeout_secs),
    )
    .await?;
    if let Err(e) = service.prime_capacity().await {
        error!(error=%e,"could not reach the chunk server hence shutting down");
        return Err(e);
    }
    service.start_and_accept().await
}
