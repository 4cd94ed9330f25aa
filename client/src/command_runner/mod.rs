mod fetch_file_handler;
mod store_file_handler;

use crate::{chunkserver_service::ChunkserverService, metaserver_service::MetaserverService};
use fetch_file_handler::FetchFileHandler;
use store_file_handler::StoreFileHandler;
use utilities::result::{DfsError, Result};

pub struct CommandRunner {
    metaserver: MetaserverService,
    chunkserver: ChunkserverService,
}

impl CommandRunner {
    pub fn new(metaserver: MetaserverService, chunkserver: ChunkserverService) -> Self {
        Self {
            metaserver,
            chunkserver,
        }
    }

    /// Runs one file system command and returns the text to print.
    pub async fn run(&self, args: &[String]) -> Result<String> {
        let command = args[0].as_str();
        match command {
            "read" => {
                let name = Self::required(args, 1, "read <filename>")?;
                FetchFileHandler::new(self.metaserver.clone(), self.chunkserver.clone())
                    .fetch_file(name)
                    .await
            }
            "write" => {
                let name = Self::required(args, 1, "write <filename>")?;
                StoreFileHandler::new(self.metaserver.clone(), self.chunkserver.clone())
                    .store_file(name)
                    .await
            }
            "ls" => {
                let names = self.metaserver.list_files().await?;
                Ok(names.join("\n"))
            }
            "stat" => {
                let name = Self::required(args, 1, "stat <filename>")?;
                let stat = self.metaserver.stat(name).await?;
                Ok(format!(
                    "file name: {}\ncreated: {}\nsize: {} bytes",
                    stat.name, stat.created_date, stat.size
                ))
            }
            "filesize" => {
                let name = Self::required(args, 1, "filesize <filename>")?;
                let size = self.metaserver.file_size(name).await?;
                Ok(size.to_string())
            }
            "rename" => {
                let old = Self::required(args, 1, "rename <filename> <new filename>")?;
                let new = Self::required(args, 2, "rename <filename> <new filename>")?;
                self.metaserver.rename(old, new).await
            }
            "diskcapacity" => {
                let capacity = self.metaserver.disk_capacity().await?;
                Ok(format!("{capacity} bytes of disk space left"))
            }
            "nodestat" => self.metaserver.node_stat(args.get(1).map(|s| s.as_str())).await,
            "stopnode" => {
                let node_id = self.metaserver.stop_node().await?;
                Ok(format!("node with id {node_id} stopped"))
            }
            "kill" => self.metaserver.kill_server().await,
            unknown => Err(DfsError::BadRequest(format!(
                "{unknown} is not a command. See 'help'"
            ))),
        }
    }

    fn required<'a>(args: &'a [String], index: usize, usage: &str) -> Result<&'a str> {
        args.get(index)
            .map(|s| s.as_str())
            .ok_or_else(|| DfsError::BadRequest(format!("missing argument: {usage}")))
    }
}
