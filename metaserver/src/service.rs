use crate::{chunk_link::ChunkLink, metadata_index::MetadataIndex};
use protocol::{
    envelope::{Message, Response},
    frame::{recv_json, send_json},
    types::FileEntrySnapshot,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Mutex,
    time::timeout,
};
use utilities::{
    logger::{Instrument, Span, error, info, trace},
    result::{DfsError, Result},
    retry_policy::retry_with_backoff,
};

/// Per-connection command dispatch loop for the metadata tier. Handles the
/// client-facing namespace commands plus the chunk server's `updateentry`
/// write reports.
pub struct MetaService {
    listener: TcpListener,
    index: Arc<Mutex<MetadataIndex>>,
    chunk_link: Arc<ChunkLink>,
    idle_timeout: Duration,
}

impl MetaService {
    pub async fn new(
        address: String,
        index: Arc<Mutex<MetadataIndex>>,
        chunk_link: ChunkLink,
        idle_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self::from_listener(listener, index, chunk_link, idle_timeout))
    }

    pub fn from_listener(
        listener: TcpListener,
        index: Arc<Mutex<MetadataIndex>>,
        chunk_link: ChunkLink,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            listener,
            index,
            chunk_link: Arc::new(chunk_link),
            idle_timeout,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Seeds the capacity cache from the chunk server's node report. The
    /// chunk server may still be coming up, so this retries with backoff and
    /// is fatal only after the retries are exhausted.
    pub async fn prime_capacity(&self) -> Result<()> {
        let report = retry_with_backoff(|| async { self.chunk_link.node_status().await }, 5).await?;
        let mut index = self.index.lock().await;
        index.recompute_capacity(&report);
        info!(capacity=%index.disk_capacity(),"primed capacity from chunk server report");
        Ok(())
    }

    pub async fn start_and_accept(&self) -> Result<()> {
        info!("metadata service accepting connections");
        loop {
            let (tcp_stream, peer) = self.listener.accept().await?;
            let index = self.index.clone();
            let chunk_link = self.chunk_link.clone();
            let idle_timeout = self.idle_timeout;
            let span = Span::current();
            tokio::spawn(
                async move {
                    trace!(%peer, "accepted connection");
                    if let Err(e) =
                        Self::handle_connection(tcp_stream, index, chunk_link, idle_timeout).await
                    {
                        error!(error=%e,"error while handling the tcp connection");
                    }
                }
                .instrument(span),
            );
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        index: Arc<Mutex<MetadataIndex>>,
        chunk_link: Arc<ChunkLink>,
        idle_timeout: Duration,
    ) -> Result<()> {
        loop {
            let msg: Message = match timeout(idle_timeout, recv_json(&mut stream)).await {
                Err(_) => {
                    trace!("closing idle connection");
                    break;
                }
                Ok(Err(e)) => {
                    trace!(error=%e,"connection closed");
                    break;
                }
                Ok(Ok(msg)) => msg,
            };
            if let Err(e) =
                Self::dispatch(&msg, &mut stream, &index, &chunk_link, idle_timeout).await
            {
                if e.is_recoverable() {
                    send_json(&mut stream, &Response::failure(&e)).await?;
                } else {
                    let _ = send_json(&mut stream, &Response::failure(&e)).await;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn dispatch(
        msg: &Message,
        stream: &mut TcpStream,
        index: &Arc<Mutex<MetadataIndex>>,
        chunk_link: &ChunkLink,
        idle_timeout: Duration,
    ) -> Result<()> {
        trace!(command=%msg.command,args=?msg.args,"dispatching command");
        match msg.command.as_str() {
            "read" => {
                let snapshot = index.lock().await.locate(msg.arg(0)?)?;
                send_json(stream, &Response::ok(serde_json::to_value(snapshot)?)).await?;
            }
            "write" => {
                let name = msg.arg(0)?.to_owned();
                let size: u64 = msg.arg(1)?.parse()?;
                let snapshot = {
                    let mut index = index.lock().await;
                    // every byte lands three times, admit against the
                    // replicated footprint
                    let needed = size.saturating_mul(3);
                    if needed > index.disk_capacity() {
                        return Err(DfsError::NoCapacity(format!(
                            "write of {size} bytes needs {needed} bytes across replicas, only {} free",
                            index.disk_capacity()
                        )));
                    }
                    index.create_or_get(&name)
                };
                send_json(stream, &Response::ok(serde_json::to_value(snapshot)?)).await?;
            }
            "ls" => {
                let names = index.lock().await.list_names();
                send_json(stream, &Response::ok(json!(names))).await?;
            }
            "stat" => {
                let stat = index.lock().await.stat(msg.arg(0)?)?;
                send_json(stream, &Response::ok(serde_json::to_value(stat)?)).await?;
            }
            "filesize" => {
                // -1 sentinel for a missing entry, never an error
                let size = index.lock().await.file_size(msg.arg(0)?);
                send_json(stream, &Response::ok(json!(size))).await?;
            }
            "rename" => {
                let (old, new) = (msg.arg(0)?.to_owned(), msg.arg(1)?.to_owned());
                index.lock().await.rename(&old, &new)?;
                send_json(stream, &Response::text(format!("renamed {old} to {new}"))).await?;
            }
            "diskcapacity" => {
                let capacity = index.lock().await.disk_capacity();
                send_json(stream, &Response::ok(json!(capacity))).await?;
            }
            "nodestat" => {
                let node_id = match msg.args.first() {
                    Some(raw) => Some(raw.parse::<usize>()?),
                    None => None,
                };
                let report = chunk_link.node_status().await?;
                let stat_string = index.lock().await.node_stat(&report, node_id)?;
                send_json(stream, &Response::text(stat_string)).await?;
            }
            "stopnode" => {
                let target = index.lock().await.pick_failure_target()?;
                // copies stay valid until the chunk server confirms the kill
                chunk_link.kill_node(target).await?;
                let report = chunk_link.node_status().await?;
                {
                    let mut index = index.lock().await;
                    index.invalidate_node(target);
                    index.recompute_capacity(&report);
                }
                send_json(stream, &Response::ok(json!(target))).await?;
            }
            "updateentry" => {
                let report: FileEntrySnapshot = timed(idle_timeout, recv_json(stream)).await?;
                index.lock().await.apply_write_report(report);
                let node_report = chunk_link.node_status().await?;
                index.lock().await.recompute_capacity(&node_report);
                send_json(stream, &Response::text("entry updated")).await?;
            }
            "killserver" => {
                send_json(stream, &Response::text("metadata server shutting down")).await?;
                if let Err(e) = chunk_link.kill_server().await {
                    error!(error=%e,"chunk server did not acknowledge shutdown");
                }
                info!("killserver received, exiting");
                std::process::exit(1);
            }
            unknown => {
                return Err(DfsError::BadRequest(format!(
                    "{unknown} is not a metadata server command"
                )));
            }
        }
        Ok(())
    }
}

/// Bounds a mid-command stream read with the same idle timeout as the
/// envelope loop, so a stalled peer cannot pin the session.
async fn timed<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DfsError::Internal(
            "peer stalled mid command, closing the session".to_owned(),
        )),
    }
}
