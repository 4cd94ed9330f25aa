use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One physical instance of a chunk on one node. `valid = false` means the
/// node was reported failed; the bytes stay resident but are unreadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyInfo {
    pub node: usize,
    pub addr: usize,
    pub valid: bool,
    pub size: u64,
}

/// Placement record for one chunk: the primary node it was first written to
/// plus every replica, primary included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub primary: usize,
    pub copies: Vec<CopyInfo>,
}

impl ChunkMetadata {
    pub fn invalidate_node(&mut self, node_id: usize) {
        for copy in self.copies.iter_mut() {
            if copy.node == node_id {
                copy.valid = false;
            }
        }
    }
}

/// Wire form of a file entry. The authoritative entry lives only inside the
/// metadata index; the chunkserver receives this snapshot, rebuilds its chunk
/// list during a write and reports it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntrySnapshot {
    pub name: String,
    pub size: u64,
    pub created_date: DateTime<Utc>,
    pub chunks: Vec<ChunkMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: usize,
    pub capacity: u64,
    pub used: u64,
    pub running: bool,
}

impl NodeStatus {
    pub fn free(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }
}

/// Payload of a successful `stat` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStat {
    pub name: String,
    pub created_date: DateTime<Utc>,
    pub size: u64,
}
