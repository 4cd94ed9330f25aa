use crate::{chunkserver_service::ChunkserverService, metaserver_service::MetaserverService};
use utilities::{
    logger::{info, instrument, trace, tracing},
    result::{DfsError, Result},
};

pub struct StoreFileHandler {
    metaserver: MetaserverService,
    chunkserver: ChunkserverService,
}

impl StoreFileHandler {
    pub fn new(metaserver: MetaserverService, chunkserver: ChunkserverService) -> Self {
        Self {
            metaserver,
            chunkserver,
        }
    }

    /// Creates or locates the entry on the metadata server, then streams the
    /// local file's bytes to the chunk server addressed by the returned
    /// snapshot.
    #[instrument(skip(self))]
    pub async fn store_file(&self, local_file_path: &str) -> Result<String> {
        let file_metadata = match tokio::fs::metadata(local_file_path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                return Err(DfsError::BadRequest(format!(
                    "cannot read file metadata for {local_file_path}: {e}"
                )));
            }
        };
        if file_metadata.is_dir() {
            return Err(DfsError::BadRequest(format!(
                "provided file path ({local_file_path}) is a directory"
            )));
        }
        info!(size=%file_metadata.len(),"storing file");
        let snapshot = self
            .metaserver
            .prepare_write(local_file_path, file_metadata.len())
            .await?;
        trace!(?snapshot, "got metadata server response");
        let data = tokio::fs::read(local_file_path).await?;
        self.chunkserver.store(&snapshot, &data).await?;
        Ok(format!(
            "stored {} ({} bytes)",
            snapshot.name,
            data.len()
        ))
    }
}
