use chrono::{DateTime, Utc};
use protocol::types::{ChunkMetadata, FileEntrySnapshot, FileStat, NodeStatus};
use rand::Rng;
use std::collections::HashMap;
use utilities::{
    logger::{info, warn},
    result::{DfsError, Result},
};

/// A named file: unique namespace key, cumulative byte size, creation
/// timestamp set once, and the chunk list in write order. Owned exclusively
/// by the index; everything else sees snapshots.
#[derive(Debug, Clone)]
pub struct FileEntry {
    name: String,
    size: u64,
    created_date: DateTime<Utc>,
    chunks: Vec<ChunkMetadata>,
}

impl FileEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            size: 0,
            created_date: Utc::now(),
            chunks: vec![],
        }
    }

    pub fn snapshot(&self) -> FileEntrySnapshot {
        FileEntrySnapshot {
            name: self.name.clone(),
            size: self.size,
            created_date: self.created_date,
            chunks: self.chunks.clone(),
        }
    }
}

/// The file namespace plus aggregate disk-capacity bookkeeping. One lock
/// around the whole structure: namespace and capacity always change together.
pub struct MetadataIndex {
    files: HashMap<String, FileEntry>,
    disk_capacity: u64,
    node_count: usize,
}

impl MetadataIndex {
    pub fn new(node_count: usize) -> Self {
        Self {
            files: HashMap::new(),
            disk_capacity: 0,
            node_count,
        }
    }

    /// Returns the existing entry (the caller is about to overwrite its
    /// chunks) or inserts a fresh zero-size entry stamped with the current
    /// time.
    pub fn create_or_get(&mut self, name: &str) -> FileEntrySnapshot {
        self.files
            .entry(name.to_owned())
            .or_insert_with(|| FileEntry::new(name))
            .snapshot()
    }

    pub fn locate(&self, name: &str) -> Result<FileEntrySnapshot> {
        match self.files.get(name) {
            Some(entry) => Ok(entry.snapshot()),
            None => Err(DfsError::NotFound(format!("file {name} does not exist"))),
        }
    }

    /// Namespace-key migration. Fails if the source is absent or the
    /// destination already exists, so a rename can never silently drop data.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if self.files.contains_key(new) {
            return Err(DfsError::BadRequest(format!(
                "destination {new} already exists"
            )));
        }
        match self.files.remove(old) {
            Some(mut entry) => {
                entry.name = new.to_owned();
                self.files.insert(new.to_owned(), entry);
                info!(%old,%new,"renamed file entry");
                Ok(())
            }
            None => Err(DfsError::NotFound(format!("file {old} does not exist"))),
        }
    }

    pub fn stat(&self, name: &str) -> Result<FileStat> {
        let entry = self
            .files
            .get(name)
            .ok_or_else(|| DfsError::NotFound(format!("file {name} does not exist")))?;
        Ok(FileStat {
            name: entry.name.clone(),
            created_date: entry.created_date,
            size: entry.size,
        })
    }

    /// Size of the named file, or -1 when the entry is non-existent.
    pub fn file_size(&self, name: &str) -> i64 {
        match self.files.get(name) {
            Some(entry) => entry.size as i64,
            None => -1,
        }
    }

    pub fn list_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Cached aggregate free space; refreshed from node reports after every
    /// completed write.
    pub fn disk_capacity(&self) -> u64 {
        self.disk_capacity
    }

    pub fn recompute_capacity(&mut self, report: &[NodeStatus]) {
        self.disk_capacity = report.iter().map(|node| node.free()).sum();
    }

    pub fn node_stat(&self, report: &[NodeStatus], node_id: Option<usize>) -> Result<String> {
        match node_id {
            Some(id) => {
                let node = report.iter().find(|node| node.id == id).ok_or_else(|| {
                    DfsError::BadRequest(format!("unknown node id {id}"))
                })?;
                Ok(Self::format_node(node))
            }
            None => {
                let mut stat_string = format!(
                    "total leftover disk space: {} bytes across {} nodes",
                    self.disk_capacity,
                    report.len()
                );
                for node in report {
                    stat_string.push('\n');
                    stat_string.push_str(&Self::format_node(node));
                }
                Ok(stat_string)
            }
        }
    }

    fn format_node(node: &NodeStatus) -> String {
        format!(
            "node {}: total {} bytes, leftover {} bytes, running {}",
            node.id,
            node.capacity,
            node.free(),
            node.running
        )
    }

    /// Picks the failure-simulation target uniformly at random from the
    /// configured pool. Irreversible within a session; no revive exists.
    pub fn pick_failure_target(&self) -> Result<usize> {
        if self.node_count == 0 {
            return Err(DfsError::NoCapacity("no nodes configured".to_owned()));
        }
        Ok(rand::thread_rng().gen_range(0..self.node_count))
    }

    /// Marks every copy referencing the node invalid, across all entries.
    /// Data on the node is not erased, only unreadable from now on.
    pub fn invalidate_node(&mut self, node_id: usize) {
        for entry in self.files.values_mut() {
            for chunk in entry.chunks.iter_mut() {
                chunk.invalidate_node(node_id);
            }
        }
        warn!(%node_id,"invalidated every copy on node");
    }

    /// Ingests the chunk server's post-write report: the entry's chunk list
    /// and size are replaced wholesale. The creation timestamp is kept if the
    /// entry already exists.
    pub fn apply_write_report(&mut self, report: FileEntrySnapshot) {
        let entry = self
            .files
            .entry(report.name.clone())
            .or_insert_with(|| FileEntry::new(&report.name));
        entry.size = report.size;
        entry.chunks = report.chunks;
        info!(name=%report.name,size=%entry.size,"applied write report");
    }
}
