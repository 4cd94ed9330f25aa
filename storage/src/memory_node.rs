use crate::data_node::DataNode;
use tracing::trace;
use utilities::result::{DfsError, Result};

/// In-memory simulated disk with a fixed capacity.
#[derive(Debug)]
pub struct MemoryNode {
    id: usize,
    capacity: u64,
    slots: Vec<Option<Vec<u8>>>,
    running: bool,
}

impl MemoryNode {
    pub fn new(id: usize, capacity: u64) -> Self {
        Self {
            id,
            capacity,
            slots: vec![],
            running: true,
        }
    }
    pub fn id(&self) -> usize {
        self.id
    }
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

impl DataNode for MemoryNode {
    fn store(&mut self, data: &[u8]) -> Result<usize> {
        if self.total_size() + data.len() as u64 > self.capacity {
            return Err(DfsError::NoCapacity(format!(
                "node {} cannot fit {} bytes",
                self.id,
                data.len()
            )));
        }
        self.slots.push(Some(data.to_vec()));
        let addr = self.slots.len() - 1;
        trace!(node=%self.id,%addr,bytes=%data.len(),"stored buffer");
        Ok(addr)
    }

    fn read_at(&self, addr: usize) -> Result<Vec<u8>> {
        match self.slots.get(addr) {
            Some(Some(data)) => Ok(data.clone()),
            Some(None) => Err(DfsError::DataUnavailable(format!(
                "node {} address {addr} was deleted",
                self.id
            ))),
            None => Err(DfsError::BadRequest(format!(
                "invalid chunk address {addr} on node {}",
                self.id
            ))),
        }
    }

    fn delete_at(&mut self, addr: usize) -> Result<()> {
        match self.slots.get_mut(addr) {
            Some(slot) => {
                *slot = None;
                trace!(node=%self.id,%addr,"tombstoned buffer");
                Ok(())
            }
            None => Err(DfsError::BadRequest(format!(
                "invalid chunk address {addr} on node {}",
                self.id
            ))),
        }
    }

    fn total_size(&self) -> u64 {
        self.slots
            .iter()
            .flatten()
            .map(|data| data.len() as u64)
            .sum()
    }

    fn free_capacity(&self) -> u64 {
        self.capacity.saturating_sub(self.total_size())
    }

    fn kill(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
