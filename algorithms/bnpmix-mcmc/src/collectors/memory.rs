use bnpmix::error::Result;
use bnpmix::state::ChainState;
use bnpmix::traits::Collector;

/// In-memory chain collector with cursor-based replay.
///
/// Snapshots are kept in insertion order; `begin_reading` rewinds the
/// cursor, so the chain can be replayed any number of times.
#[derive(Debug, Clone, Default)]
pub struct MemoryCollector {
    chain: Vec<ChainState>,
    cursor: usize,
}

impl MemoryCollector {
    pub fn new() -> Self {
        MemoryCollector::default()
    }

    /// Number of collected snapshots.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Direct access to the collected chain.
    pub fn chain(&self) -> &[ChainState] {
        &self.chain
    }
}

impl Collector for MemoryCollector {
    fn start(&mut self) -> Result<()> {
        self.chain.clear();
        self.cursor = 0;
        Ok(())
    }

    fn append(&mut self, state: &ChainState) -> Result<()> {
        self.chain.push(state.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn begin_reading(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next_state(&mut self) -> Result<Option<ChainState>> {
        let state = self.chain.get(self.cursor).cloned();
        if state.is_some() {
            self.cursor += 1;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnpmix::state::MixingState;

    fn dummy_state(iteration: usize) -> ChainState {
        ChainState {
            iteration,
            cluster_states: vec![],
            allocations: vec![0; 4],
            mixing_state: MixingState::Dirichlet { total_mass: 1.0 },
        }
    }

    #[test]
    fn replay_preserves_order_and_allows_multiple_passes() {
        let mut coll = MemoryCollector::new();
        coll.start().unwrap();
        for t in 0..5 {
            coll.append(&dummy_state(t)).unwrap();
        }
        coll.finish().unwrap();

        for _ in 0..2 {
            coll.begin_reading().unwrap();
            let mut seen = 0;
            while let Some(state) = coll.next_state().unwrap() {
                assert_eq!(state.iteration, seen);
                seen += 1;
            }
            assert_eq!(seen, 5);
        }
    }
}
