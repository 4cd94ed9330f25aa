use crate::{chunkserver_service::ChunkserverService, metaserver_service::MetaserverService};
use utilities::{
    logger::{instrument, trace, tracing},
    result::Result,
};

pub struct FetchFileHandler {
    metaserver: MetaserverService,
    chunkserver: ChunkserverService,
}

impl FetchFileHandler {
    pub fn new(metaserver: MetaserverService, chunkserver: ChunkserverService) -> Self {
        Self {
            metaserver,
            chunkserver,
        }
    }

    /// Locates the entry, then reads the chunk data directly from the chunk
    /// server using the copy addresses in the snapshot.
    #[instrument(skip(self))]
    pub async fn fetch_file(&self, name: &str) -> Result<String> {
        let snapshot = self.metaserver.locate(name).await?;
        trace!(chunks=%snapshot.chunks.len(),"got metadata server response");
        let content = self.chunkserver.fetch(&snapshot).await?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }
}
