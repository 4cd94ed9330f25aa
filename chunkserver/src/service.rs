use crate::{chunk_manager::ChunkManager, meta_link::MetaLink};
use protocol::{
    envelope::{Message, Response},
    frame::{recv_json, send_json, write_frame},
    types::FileEntrySnapshot,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
    time::timeout,
};
use utilities::{
    logger::{Instrument, Span, error, info, trace},
    result::{DfsError, Result},
};

/// Per-connection command dispatch loop for the chunk tier: `read`, `write`,
/// `killnode`, `nodestat`, plus the internal `killserver` forwarded by the
/// metaserver.
pub struct ChunkService {
    listener: TcpListener,
    manager: Arc<ChunkManager>,
    meta_link: Arc<MetaLink>,
    idle_timeout: Duration,
}

impl ChunkService {
    pub async fn new(
        address: String,
        manager: Arc<ChunkManager>,
        meta_link: MetaLink,
        idle_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self::from_listener(listener, manager, meta_link, idle_timeout))
    }

    pub fn from_listener(
        listener: TcpListener,
        manager: Arc<ChunkManager>,
        meta_link: MetaLink,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            listener,
            manager,
            meta_link: Arc::new(meta_link),
            idle_timeout,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn start_and_accept(&self) -> Result<()> {
        info!(pool = %self.manager.info(), "chunk service accepting connections");
        loop {
            let (tcp_stream, peer) = self.listener.accept().await?;
            let manager = self.manager.clone();
            let meta_link = self.meta_link.clone();
            let idle_timeout = self.idle_timeout;
            let span = Span::current();
            tokio::spawn(
                async move {
                    trace!(%peer, "accepted connection");
                    if let Err(e) =
                        Self::handle_connection(tcp_stream, manager, meta_link, idle_timeout).await
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
        manager: Arc<ChunkManager>,
        meta_link: Arc<MetaLink>,
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
                Self::dispatch(&msg, &mut stream, &manager, &meta_link, idle_timeout).await
            {
                if e.is_recoverable() {
                    send_json(&mut stream, &Response::failure(&e)).await?;
                } else {
                    // transport/decode failure: report once, end only this
                    // connection's loop
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
        manager: &ChunkManager,
        meta_link: &MetaLink,
        idle_timeout: Duration,
    ) -> Result<()> {
        trace!(command=%msg.command,args=?msg.args,"dispatching command");
        match msg.command.as_str() {
            "read" => {
                let snapshot: FileEntrySnapshot = timed(idle_timeout, recv_json(stream)).await?;
                let content = manager.read(&snapshot.chunks).await?;
                send_json(stream, &Response::ok(json!(content.len()))).await?;
                write_frame(stream, &content).await?;
            }
            "write" => {
                let size: u64 = msg.arg(1)?.parse()?;
                let snapshot: FileEntrySnapshot = timed(idle_timeout, recv_json(stream)).await?;
                let mut limited = (&mut *stream).take(size);
                let result = manager.write(snapshot, &mut limited, idle_timeout).await;
                if result.is_err() {
                    // leave the connection parseable for the next command
                    let mut sink = tokio::io::sink();
                    let drain = tokio::io::copy(&mut limited, &mut sink);
                    let _ = timeout(idle_timeout, drain).await;
                }
                let report = result?;
                meta_link.report_entry(&report).await?;
                send_json(
                    stream,
                    &Response::ok(json!({
                        "name": report.name,
                        "size": report.size,
                        "chunks": report.chunks.len(),
                    })),
                )
                .await?;
            }
            "killnode" => {
                let node_id: usize = msg.arg(0)?.parse()?;
                manager.kill_node(node_id).await?;
                send_json(
                    stream,
                    &Response::text(format!("node with id {node_id} successfully killed")),
                )
                .await?;
            }
            "nodestat" => {
                let report = manager.node_status().await;
                send_json(stream, &Response::ok(serde_json::to_value(report)?)).await?;
            }
            "killserver" => {
                send_json(stream, &Response::text("chunk server shutting down")).await?;
                info!("killserver received, exiting");
                std::process::exit(1);
            }
            unknown => {
                return Err(DfsError::BadRequest(format!(
                    "{unknown} is not a chunk server command"
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
