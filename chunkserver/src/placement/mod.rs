use utilities::result::{DfsError, Result};

/// Picks the two replica targets for a block, given the primary node and the
/// running flags of the whole pool. Implementations must return two distinct
/// running nodes, both different from the primary.
pub trait PlacementPolicy {
    fn replica_targets(&self, primary: usize, running: &[bool]) -> Result<(usize, usize)>;
}

/// One near replica, one far replica: `primary + 1` lands on the adjacent
/// node (cheap single-disk recovery), `primary + nodes_per_rack - 1` lands in
/// a different rack (survives a rack-level failure). Both wrap modulo the
/// pool size. A computed target that collides with an already chosen node or
/// lands on a stopped node is substituted by the next running node after it.
pub struct RackAwarePlacement {
    nodes_per_rack: usize,
}

impl RackAwarePlacement {
    pub fn new(nodes_per_rack: usize) -> Self {
        Self { nodes_per_rack }
    }

    fn substitute(candidate: usize, running: &[bool], chosen: &[usize]) -> Result<usize> {
        let pool = running.len();
        for step in 0..pool {
            let id = (candidate + step) % pool;
            if running[id] && !chosen.contains(&id) {
                return Ok(id);
            }
        }
        Err(DfsError::NoCapacity(
            "fewer than 3 running nodes available for replica placement".to_owned(),
        ))
    }
}

impl PlacementPolicy for RackAwarePlacement {
    fn replica_targets(&self, primary: usize, running: &[bool]) -> Result<(usize, usize)> {
        let pool = running.len();
        let mut chosen = vec![primary];
        for offset in [1, self.nodes_per_rack.saturating_sub(1)] {
            let candidate = (primary + offset) % pool;
            let target = Self::substitute(candidate, running, &chosen)?;
            chosen.push(target);
        }
        Ok((chosen[1], chosen[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_and_far_targets_on_a_healthy_pool() {
        let policy = RackAwarePlacement::new(4);
        let running = vec![true; 8];
        let (near, far) = policy.replica_targets(2, &running).unwrap();
        assert_eq!(near, 3);
        assert_eq!(far, 5);
    }

    #[test]
    fn offsets_wrap_around_the_pool() {
        let policy = RackAwarePlacement::new(4);
        let running = vec![true; 8];
        let (near, far) = policy.replica_targets(7, &running).unwrap();
        assert_eq!(near, 0);
        assert_eq!(far, 2);
    }

    #[test]
    fn colliding_offsets_are_substituted() {
        // nodes_per_rack = 2 makes both offsets equal to 1
        let policy = RackAwarePlacement::new(2);
        let running = vec![true; 4];
        let (near, far) = policy.replica_targets(1, &running).unwrap();
        assert_ne!(near, far);
        assert_ne!(near, 1);
        assert_ne!(far, 1);
    }

    #[test]
    fn stopped_targets_are_skipped() {
        let policy = RackAwarePlacement::new(4);
        let mut running = vec![true; 8];
        running[3] = false;
        running[5] = false;
        let (near, far) = policy.replica_targets(2, &running).unwrap();
        assert_eq!(near, 4);
        assert_eq!(far, 6);
    }

    #[test]
    fn too_few_running_nodes_is_no_capacity() {
        let policy = RackAwarePlacement::new(2);
        let running = vec![true, false, true, false];
        let err = policy.replica_targets(0, &running).unwrap_err();
        assert!(matches!(err, DfsError::NoCapacity(_)));
    }
}
