use crate::placement::{PlacementPolicy, RackAwarePlacement};
use protocol::types::{ChunkMetadata, CopyInfo, FileEntrySnapshot, NodeStatus};
use rand::Rng;
use std::{sync::Arc, time::Duration};
use storage::{data_node::DataNode, memory_node::MemoryNode};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::Mutex,
    time::timeout,
};
use utilities::{
    logger::{info, instrument, tracing, warn},
    result::{DfsError, Result},
};

/// Validated pool geometry, converted from the loose config at startup.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub nodes: usize,
    pub chunk_size: usize,
    pub nodes_per_rack: usize,
    pub node_capacity: u64,
}

impl StoreSettings {
    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 || self.chunk_size == 0 || self.node_capacity == 0 {
            return Err(DfsError::BadRequest(
                "nodes, chunk_size and node_capacity must all be non-zero".to_owned(),
            ));
        }
        if self.nodes_per_rack == 0 || self.nodes % self.nodes_per_rack != 0 {
            return Err(DfsError::BadRequest(format!(
                "node count {} is not divisible into racks of {}",
                self.nodes, self.nodes_per_rack
            )));
        }
        Ok(())
    }
    pub fn rack_count(&self) -> usize {
        self.nodes / self.nodes_per_rack
    }
}

/// Owns the node pool and implements replica placement and chunk I/O. Each
/// node carries its own lock so a long write session never blocks reads that
/// touch other nodes.
pub struct ChunkManager {
    nodes: Vec<Arc<Mutex<MemoryNode>>>,
    chunk_size: usize,
    nodes_per_rack: usize,
    rack_count: usize,
    placement: Box<dyn PlacementPolicy + Send + Sync>,
}

impl ChunkManager {
    pub fn new(settings: StoreSettings) -> Result<Self> {
        settings.validate()?;
        let nodes = (0..settings.nodes)
            .map(|id| Arc::new(Mutex::new(MemoryNode::new(id, settings.node_capacity))))
            .collect();
        Ok(Self {
            nodes,
            chunk_size: settings.chunk_size,
            nodes_per_rack: settings.nodes_per_rack,
            rack_count: settings.rack_count(),
            placement: Box::new(RackAwarePlacement::new(settings.nodes_per_rack)),
        })
    }

    pub fn info(&self) -> String {
        format!(
            "pool of {} nodes, {} per rack, {} racks",
            self.nodes.len(),
            self.nodes_per_rack,
            self.rack_count
        )
    }

    async fn running_flags(&self) -> Vec<bool> {
        let mut flags = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            flags.push(node.lock().await.is_running());
        }
        flags
    }

    fn pick_write_node(running: &[bool]) -> Result<usize> {
        let candidates: Vec<usize> = running
            .iter()
            .enumerate()
            .filter(|(_, up)| **up)
            .map(|(id, _)| id)
            .collect();
        if candidates.is_empty() {
            return Err(DfsError::NoCapacity(
                "no running node available for placement".to_owned(),
            ));
        }
        let pick = rand::thread_rng().gen_range(0..candidates.len());
        Ok(candidates[pick])
    }

    /// Serves a whole-file read against the given chunk list. Buffers
    /// internally and returns fully or not at all: a chunk with no servable
    /// copy fails the entire read.
    #[instrument(name = "chunk_manager_read", skip(self, chunks))]
    pub async fn read(&self, chunks: &[ChunkMetadata]) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let mut found_valid_copy = false;
            for copy in &chunk.copies {
                if !copy.valid {
                    continue;
                }
                let Some(node) = self.nodes.get(copy.node) else {
                    continue;
                };
                let node = node.lock().await;
                if !node.is_running() {
                    continue;
                }
                match node.read_at(copy.addr) {
                    Ok(data) => {
                        content.extend_from_slice(&data);
                        found_valid_copy = true;
                        break;
                    }
                    Err(e) => {
                        warn!(node=%copy.node,addr=%copy.addr,error=%e,"copy marked valid but unreadable");
                    }
                }
            }
            if !found_valid_copy {
                return Err(DfsError::DataUnavailable(format!(
                    "no valid chunk data found for chunk {index}"
                )));
            }
        }
        Ok(content)
    }

    /// Rewrites the entry from the incoming stream: drops every previously
    /// referenced copy, then places each block of up to `chunk_size` bytes on
    /// a random primary plus two placement targets. Returns the rebuilt
    /// snapshot for the metadata report.
    #[instrument(name = "chunk_manager_write", skip(self, snapshot, data_stream, read_timeout), fields(name = %snapshot.name))]
    pub async fn write(
        &self,
        mut snapshot: FileEntrySnapshot,
        data_stream: &mut (impl AsyncRead + Unpin),
        read_timeout: Duration,
    ) -> Result<FileEntrySnapshot> {
        self.purge_entry(&snapshot).await;
        snapshot.chunks.clear();
        snapshot.size = 0;
        if let Err(e) = self
            .write_blocks(&mut snapshot, data_stream, read_timeout)
            .await
        {
            // drop the blocks this session already placed so nothing stays
            // resident without a metadata reference
            self.purge_entry(&snapshot).await;
            return Err(e);
        }
        info!(size=%snapshot.size,chunks=%snapshot.chunks.len(),"write session finished");
        Ok(snapshot)
    }

    async fn write_blocks(
        &self,
        snapshot: &mut FileEntrySnapshot,
        data_stream: &mut (impl AsyncRead + Unpin),
        read_timeout: Duration,
    ) -> Result<()> {
        loop {
            let Some(block) = read_block(data_stream, self.chunk_size, read_timeout).await? else {
                break;
            };
            let running = self.running_flags().await;
            let primary = Self::pick_write_node(&running)?;
            let (near, far) = self.placement.replica_targets(primary, &running)?;
            let copies = self.scatter_block(block, [primary, near, far]).await?;
            snapshot.size += copies[0].size;
            snapshot.chunks.push(ChunkMetadata { primary, copies });
        }
        Ok(())
    }

    /// Fans one buffer out to three node writes running concurrently. The
    /// chunk is durable only once all three are accounted for: on a partial
    /// failure the copies that did land are tombstoned back out and the
    /// first error is returned.
    async fn scatter_block(&self, block: Vec<u8>, targets: [usize; 3]) -> Result<Vec<CopyInfo>> {
        let block = Arc::new(block);
        let mut handles = Vec::with_capacity(targets.len());
        for id in targets {
            let node = self.nodes[id].clone();
            let data = block.clone();
            handles.push(tokio::spawn(async move {
                let mut node = node.lock().await;
                node.store(&data).map(|addr| CopyInfo {
                    node: id,
                    addr,
                    valid: true,
                    size: data.len() as u64,
                })
            }));
        }
        let mut copies = Vec::with_capacity(targets.len());
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(copy)) => copies.push(copy),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(DfsError::Internal(format!("replica task: {e}")));
                }
            }
        }
        if let Some(error) = first_error {
            for copy in copies {
                let mut node = self.nodes[copy.node].lock().await;
                if let Err(e) = node.delete_at(copy.addr) {
                    warn!(node=%copy.node,addr=%copy.addr,error=%e,"failed to roll back replica");
                }
            }
            return Err(error);
        }
        Ok(copies)
    }

    /// Best-effort removal of every copy the entry currently references.
    /// Deletion failures are logged, never fatal.
    async fn purge_entry(&self, snapshot: &FileEntrySnapshot) {
        for chunk in &snapshot.chunks {
            for copy in &chunk.copies {
                let Some(node) = self.nodes.get(copy.node) else {
                    warn!(node=%copy.node,"stale copy references unknown node");
                    continue;
                };
                let mut node = node.lock().await;
                match node.delete_at(copy.addr) {
                    Ok(()) => info!(node=%copy.node,addr=%copy.addr,"deleted chunk copy"),
                    Err(e) => warn!(node=%copy.node,addr=%copy.addr,error=%e,"failed to delete chunk copy"),
                }
            }
        }
    }

    /// Marks a node unavailable. Its buffers stay resident but it is never a
    /// placement target or a read source afterward.
    #[instrument(name = "chunk_manager_kill_node", skip(self))]
    pub async fn kill_node(&self, node_id: usize) -> Result<()> {
        let Some(node) = self.nodes.get(node_id) else {
            return Err(DfsError::BadRequest(format!("unknown node id {node_id}")));
        };
        node.lock().await.kill();
        info!(%node_id, "node killed");
        Ok(())
    }

    pub async fn node_status(&self) -> Vec<NodeStatus> {
        let mut report = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let node = node.lock().await;
            report.push(NodeStatus {
                id: node.id(),
                capacity: node.capacity(),
                used: node.total_size(),
                running: node.is_running(),
            });
        }
        report
    }
}

/// Reads up to `chunk_size` bytes from the stream; `None` once the stream is
/// exhausted. Every read is bounded by `read_timeout` so a stalled sender
/// fails the session instead of pinning it.
async fn read_block(
    stream: &mut (impl AsyncRead + Unpin),
    chunk_size: usize,
    read_timeout: Duration,
) -> Result<Option<Vec<u8>>> {
    let mut block = vec![0u8; chunk_size];
    let mut filled = 0;
    while filled < chunk_size {
        let n = match timeout(read_timeout, stream.read(&mut block[filled..])).await {
            Ok(n) => n?,
            Err(_) => {
                return Err(DfsError::Internal(
                    "timed out waiting for chunk data".to_owned(),
                ));
            }
        };
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled == 0 {
        return Ok(None);
    }
    block.truncate(filled);
    Ok(Some(block))
}
