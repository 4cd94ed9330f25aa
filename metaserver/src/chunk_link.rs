use protocol::{
    envelope::{Message, Response},
    frame::{recv_json, send_json},
    types::NodeStatus,
};
use serde_json::Value;
use tokio::net::TcpStream;
use utilities::{
    logger::{instrument, trace, tracing},
    result::Result,
};

/// Outbound link to the chunk server. One short-lived connection per
/// exchange; the metaserver uses it for node reports, kill instructions and
/// shutdown forwarding.
pub struct ChunkLink {
    addrs: String,
}

impl ChunkLink {
    pub fn new(addrs: String) -> Self {
        Self { addrs }
    }

    async fn call(&self, msg: Message) -> Result<Value> {
        let mut stream = TcpStream::connect(&self.addrs).await?;
        send_json(&mut stream, &msg).await?;
        let response: Response = recv_json(&mut stream).await?;
        trace!(command=%msg.command,?response,"chunk server replied");
        response.into_result()
    }

    #[instrument(name = "chunk_link_node_status", skip(self))]
    pub async fn node_status(&self) -> Result<Vec<NodeStatus>> {
        let value = self.call(Message::new("nodestat", vec![])).await?;
        Ok(serde_json::from_value(value)?)
    }

    #[instrument(name = "chunk_link_kill_node", skip(self))]
    pub async fn kill_node(&self, node_id: usize) -> Result<()> {
        self.call(Message::new("killnode", vec![node_id.to_string()]))
            .await
            .map(|_| ())
    }

    /// Best effort: the chunk server exits as soon as it has acknowledged,
    /// so a dropped connection here is not an error worth surfacing.
    pub async fn kill_server(&self) -> Result<()> {
        self.call(Message::new("killserver", vec![]))
            .await
            .map(|_| ())
    }
}
