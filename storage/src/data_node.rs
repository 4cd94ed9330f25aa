use utilities::result::Result;

/// A simulated storage unit holding zero or more chunk buffers. Addresses are
/// stable for the lifetime of the node: a delete tombstones the slot instead
/// of compacting, so previously handed-out addresses never go stale.
pub trait DataNode {
    /// Appends a buffer and returns its address (the new slot index). Fails
    /// with NoCapacity when the buffer would not fit.
    fn store(&mut self, data: &[u8]) -> Result<usize>;
    fn read_at(&self, addr: usize) -> Result<Vec<u8>>;
    fn delete_at(&mut self, addr: usize) -> Result<()>;
    /// Sum of the live buffer lengths.
    fn total_size(&self) -> u64;
    fn free_capacity(&self) -> u64;
    /// Marks the node failed. There is no revive path: data stays resident
    /// but the node must never serve reads or take placements again.
    fn kill(&mut self);
    fn is_running(&self) -> bool;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use utilities::result::DfsError;

    pub fn data_node_test(mut node: impl DataNode) -> Result<()> {
        assert!(node.is_running());
        let first = node.store(b"hello")?;
        let second = node.store(b"world!")?;
        assert_eq!(node.total_size(), 11);
        assert_eq!(node.read_at(first)?, b"hello");

        // tombstoning the first slot must not move the second
        node.delete_at(first)?;
        assert_eq!(node.read_at(second)?, b"world!");
        assert_eq!(node.total_size(), 6);
        assert!(matches!(
            node.read_at(first),
            Err(DfsError::DataUnavailable(_))
        ));
        assert!(matches!(node.read_at(99), Err(DfsError::BadRequest(_))));

        node.kill();
        assert!(!node.is_running());
        Ok(())
    }
}
