use protocol::{
    envelope::{Message, Response},
    frame::{recv_json, send_json},
    types::{FileEntrySnapshot, FileStat},
};
use serde_json::Value;
use tokio::net::TcpStream;
use utilities::{
    logger::trace,
    result::{DfsError, Result},
};

/// Connection wrapper for the metadata server: one short-lived connection
/// per command, envelope in, envelope out.
#[derive(Clone)]
pub struct MetaserverService {
    addrs: String,
}

impl MetaserverService {
    pub fn new(addrs: String) -> Self {
        Self { addrs }
    }

    async fn call(&self, command: &str, args: Vec<String>) -> Result<Value> {
        let mut stream = TcpStream::connect(&self.addrs).await?;
        send_json(&mut stream, &Message::new(command, args)).await?;
        let response: Response = recv_json(&mut stream).await?;
        trace!(%command,?response,"metadata server replied");
        response.into_result()
    }

    pub async fn locate(&self, name: &str) -> Result<FileEntrySnapshot> {
        let value = self.call("read", vec![name.to_owned()]).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn prepare_write(&self, name: &str, size: u64) -> Result<FileEntrySnapshot> {
        let value = self
            .call("write", vec![name.to_owned(), size.to_string()])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn list_files(&self) -> Result<Vec<String>> {
        let value = self.call("ls", vec![]).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn stat(&self, name: &str) -> Result<FileStat> {
        let value = self.call("stat", vec![name.to_owned()]).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn file_size(&self, name: &str) -> Result<i64> {
        let value = self.call("filesize", vec![name.to_owned()]).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn rename(&self, old: &str, new: &str) -> Result<String> {
        let value = self
            .call("rename", vec![old.to_owned(), new.to_owned()])
            .await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    pub async fn disk_capacity(&self) -> Result<u64> {
        let value = self.call("diskcapacity", vec![]).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn node_stat(&self, node_id: Option<&str>) -> Result<String> {
        let args = node_id.map(|id| vec![id.to_owned()]).unwrap_or_default();
        let value = self.call("nodestat", args).await?;
        match value {
            Value::String(stat) => Ok(stat),
            other => Err(DfsError::Internal(format!(
                "unexpected nodestat payload: {other}"
            ))),
        }
    }

    pub async fn stop_node(&self) -> Result<usize> {
        let value = self.call("stopnode", vec![]).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn kill_server(&self) -> Result<String> {
        let value = self.call("killserver", vec![]).await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }
}
