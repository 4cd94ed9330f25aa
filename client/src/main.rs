mod chunkserver_service;
mod command_runner;
mod config;
mod metaserver_service;

use chunkserver_service::ChunkserverService;
use command_runner::CommandRunner;
use config::CONFIG;
use metaserver_service::MetaserverService;
use utilities::{logger::init_logger, result::Result};

const HELP_MESSAGE: &str = "usage: client [help] <command> [<args>]
general commands:
help - display this help message
kill - stop running servers

file system commands:
read <filename> - display content of specified filename
write <filename> - create file entry from specified filename on local disk
ls - list available files
stat <filename> - fetch info of file with specified filename
filesize <filename> - fetch size of file with specified filename
rename <filename> <new filename> - rename specified file entry
diskcapacity - fetch sum of leftover disk space on each chunk node
nodestat [nodeId] - fetch total disk size and leftover disk size for each chunk node
stopnode - randomly select and stop a node (simulate a node failure)";

#[tokio::main]
async fn main() -> Result<()> {
    let _gaurd = init_logger(
        "Client",
        "client_0",
        CONFIG.log_level.clone(),
        &CONFIG.log_base,
    );
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args[0] == "help" {
        println!("{HELP_MESSAGE}");
        return Ok(());
    }
    let runner = CommandRunner::new(
        MetaserverService::new(CONFIG.meta_server_addrs.clone()),
        ChunkserverService::new(CONFIG.chunk_server_addrs.clone()),
    );
    match runner.run(&args).await {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(e) => {
            eprintln!("Error : {e}");
            std::process::exit(1);
        }
    }
}
