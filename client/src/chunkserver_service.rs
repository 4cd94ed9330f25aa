use protocol::{
    envelope::{Message, Response},
    frame::{read_frame, recv_json, send_json},
    types::FileEntrySnapshot,
};
use tokio::{io::AsyncWriteExt, net::TcpStream};
use utilities::{
    logger::{instrument, trace, tracing},
    result::Result,
};

/// Connection wrapper for the chunk server, driven with the entry snapshot
/// the metadata server handed back.
#[derive(Clone)]
pub struct ChunkserverService {
    addrs: String,
}

impl ChunkserverService {
    pub fn new(addrs: String) -> Self {
        Self { addrs }
    }

    /// Streams the whole payload after the envelope and snapshot: the server
    /// reads exactly `data.len()` raw bytes before replying.
    #[instrument(name = "client_store_chunks", skip(self, snapshot, data), fields(name = %snapshot.name, bytes = %data.len()))]
    pub async fn store(&self, snapshot: &FileEntrySnapshot, data: &[u8]) -> Result<String> {
        let mut stream = TcpStream::connect(&self.addrs).await?;
        let msg = Message::new(
            "write",
            vec![snapshot.name.clone(), data.len().to_string()],
        );
        send_json(&mut stream, &msg).await?;
        send_json(&mut stream, snapshot).await?;
        stream.write_all(data).await?;
        stream.flush().await?;
        let response: Response = recv_json(&mut stream).await?;
        trace!(?response, "chunk server acknowledged write");
        let value = response.into_result()?;
        Ok(value.to_string())
    }

    #[instrument(name = "client_fetch_chunks", skip(self, snapshot), fields(name = %snapshot.name))]
    pub async fn fetch(&self, snapshot: &FileEntrySnapshot) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect(&self.addrs).await?;
        let msg = Message::new("read", vec![snapshot.name.clone()]);
        send_json(&mut stream, &msg).await?;
        send_json(&mut stream, snapshot).await?;
        let response: Response = recv_json(&mut stream).await?;
        response.into_result()?;
        read_frame(&mut stream).await
    }
}
