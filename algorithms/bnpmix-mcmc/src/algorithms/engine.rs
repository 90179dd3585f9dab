use ndarray::Array2;
use rand_isaac::Isaac64Rng;

use bnpmix::error::{Error, Result};
use bnpmix::state::{ChainState, ClusterState};
use bnpmix::traits::{Hierarchy, Mixing};

/// Mutable state of a marginal Gibbs run: the data matrix, the
/// allocation vector, the owned cluster hierarchies, the mixing and the
/// run's generator.
///
/// Cluster indices are always consecutive and every index is occupied;
/// destroying an emptied cluster compacts the higher indices down by
/// one. The family prototype carries the shared hyperparameter bundle
/// and materializes new clusters.
pub(crate) struct Engine<H: Hierarchy, M: Mixing> {
    pub(crate) data: Array2<f64>,
    pub(crate) allocations: Vec<usize>,
    pub(crate) clusters: Vec<H>,
    pub(crate) prototype: H,
    pub(crate) mixing: M,
    pub(crate) rng: Isaac64Rng,
}

impl<H: Hierarchy, M: Mixing> Engine<H, M> {
    pub(crate) fn new(
        prototype: H,
        mixing: M,
        data: Array2<f64>,
        init_clusters: usize,
        seed: u64,
    ) -> Result<Self> {
        let n = data.nrows();
        if n == 0 {
            return Err(Error::InvalidParameter(
                "data matrix has no rows".to_string(),
            ));
        }
        let k_init = init_clusters.min(n);
        let mut clusters: Vec<H> = (0..k_init).map(|_| prototype.fresh()).collect();
        let mut allocations = Vec::with_capacity(n);
        for i in 0..n {
            let k = i % k_init;
            clusters[k].add_datum(i, data.row(i));
            allocations.push(k);
        }
        Ok(Engine {
            data,
            allocations,
            clusters,
            prototype,
            mixing,
            rng: bnpmix::rng::seeded(seed),
        })
    }

    pub(crate) fn n_data(&self) -> usize {
        self.data.nrows()
    }

    pub(crate) fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub(crate) fn cards(&self) -> Vec<usize> {
        self.clusters.iter().map(|c| c.card()).collect()
    }

    /// Detaches observation `i` from its cluster, destroying the
    /// cluster and compacting the allocation vector when it empties.
    /// The observation's own allocation entry is stale until the caller
    /// reassigns it.
    pub(crate) fn detach_datum(&mut self, i: usize) {
        let k = self.allocations[i];
        let datum = self.data.row(i);
        self.clusters[k].remove_datum(i, datum);
        if self.clusters[k].card() == 0 {
            self.clusters.remove(k);
            for c in self.allocations.iter_mut() {
                if *c > k {
                    *c -= 1;
                }
            }
        }
    }

    /// Assigns observation `i` to cluster `k`.
    pub(crate) fn attach_datum(&mut self, i: usize, k: usize) {
        let datum = self.data.row(i);
        self.clusters[k].add_datum(i, datum);
        self.allocations[i] = k;
    }

    /// Resamples every cluster's state from its posterior.
    pub(crate) fn sample_unique_values(&mut self) -> Result<()> {
        for cluster in self.clusters.iter_mut() {
            cluster.sample_given_data(&mut self.rng)?;
        }
        Ok(())
    }

    /// Resamples the mixing's hyperparameters from the partition.
    pub(crate) fn update_mixing(&mut self) -> Result<()> {
        let cards = self.cards();
        let n = self.n_data();
        self.mixing.update_state(&cards, n, &mut self.rng)
    }

    /// Resamples the family's shared hyperparameters from the current
    /// cluster states; the clusters observe the update through the
    /// shared bundle.
    pub(crate) fn update_hypers(&mut self) -> Result<()> {
        let states: Vec<ClusterState> = self.clusters.iter().map(|c| c.cluster_state()).collect();
        self.prototype.update_hypers(&states, &mut self.rng)
    }

    pub(crate) fn snapshot(&self, iteration: usize) -> ChainState {
        ChainState {
            iteration,
            cluster_states: self.clusters.iter().map(|c| c.cluster_state()).collect(),
            allocations: self.allocations.clone(),
            mixing_state: self.mixing.mixing_state(),
        }
    }
}

#[cfg(test)]
impl<H: Hierarchy, M: Mixing> Engine<H, M> {
    /// Partition invariants checked after every iteration in tests.
    pub(crate) fn assert_invariants(&self) {
        let n = self.n_data();
        let n_clust = self.n_clusters();
        assert!(self.allocations.iter().all(|&c| c < n_clust));
        let mut counts = vec![0usize; n_clust];
        for &c in &self.allocations {
            counts[c] += 1;
        }
        assert!(counts.iter().all(|&c| c > 0), "empty cluster persisted");
        assert_eq!(counts.iter().sum::<usize>(), n);
        for (k, cluster) in self.clusters.iter().enumerate() {
            assert_eq!(cluster.card(), counts[k]);
            assert_eq!(cluster.data_indices().len(), counts[k]);
            for &i in cluster.data_indices() {
                assert_eq!(self.allocations[i], k);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchies::{NnigHierarchy, NnigHypers, NnigPrior};
    use crate::mixings::{DirichletProcess, DpPrior};
    use ndarray::array;

    fn test_engine() -> Engine<NnigHierarchy, DirichletProcess> {
        let prototype = NnigHierarchy::new(NnigPrior::Fixed(NnigHypers {
            mean: 0.0,
            var_scaling: 0.1,
            shape: 2.0,
            scale: 2.0,
        }))
        .unwrap();
        let mixing = DirichletProcess::new(DpPrior::Fixed { total_mass: 1.0 }).unwrap();
        let data = array![[1.0], [2.0], [3.0], [1.5]];
        Engine::new(prototype, mixing, data, 3, 0).unwrap()
    }

    #[test]
    fn round_robin_initialization_covers_every_cluster() {
        let engine = test_engine();
        assert_eq!(engine.allocations, vec![0, 1, 2, 0]);
        assert_eq!(engine.cards(), vec![2, 1, 1]);
        engine.assert_invariants();
    }

    #[test]
    fn emptied_cluster_is_destroyed_and_indices_compact() {
        // move the sole occupant of cluster 1 into (old) cluster 2
        let mut engine = test_engine();
        engine.detach_datum(1);
        assert_eq!(engine.n_clusters(), 2);
        // old cluster 2 is now cluster 1
        engine.attach_datum(1, 1);
        assert_eq!(engine.allocations, vec![0, 1, 1, 0]);
        assert_eq!(engine.cards(), vec![2, 2]);
        engine.assert_invariants();
    }

    #[test]
    fn detach_keeps_nonempty_clusters_in_place() {
        let mut engine = test_engine();
        engine.detach_datum(3);
        assert_eq!(engine.n_clusters(), 3);
        engine.attach_datum(3, 2);
        assert_eq!(engine.allocations, vec![0, 1, 2, 2]);
        engine.assert_invariants();
    }
}
