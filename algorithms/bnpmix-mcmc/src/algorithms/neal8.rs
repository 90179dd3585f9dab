use ndarray::{Array1, Array2, ArrayView2};

use bnpmix::error::{Error, Result};
use bnpmix::rng::DEFAULT_SEED;
use bnpmix::stats::{categorical_log_weights_rng, log_sum_exp};
use bnpmix::traits::{Collector, Hierarchy, Mixing};

use super::engine::Engine;
use super::marginal::{eval_chain_lpdf, run_chain};

/// Default number of auxiliary blocks.
const DEFAULT_N_AUX: usize = 3;

/// Auxiliary-variable marginal Gibbs sampler (Neal, 2000,
/// Algorithm 8).
///
/// A fixed pool of `n_aux` auxiliary hierarchies holds prior draws that
/// stand in for candidate new clusters. When the observation being
/// reallocated is a singleton, its state is recycled into slot 0 before
/// the cluster is destroyed, which preserves detailed balance. Unlike
/// the collapsed sampler this one never evaluates the prior predictive,
/// so it also works for non-conjugate hierarchies.
pub struct Neal8<H: Hierarchy, M: Mixing> {
    prototype: H,
    mixing: M,
    burnin: usize,
    iterations: usize,
    seed: u64,
    init_clusters: usize,
    n_aux: usize,
    engine: Option<Engine<H, M>>,
}

/// Validated-on-build configuration for [`Neal8`].
pub struct Neal8Params<H: Hierarchy, M: Mixing> {
    prototype: H,
    mixing: M,
    burnin: usize,
    iterations: usize,
    seed: u64,
    init_clusters: usize,
    n_aux: usize,
}

impl<H: Hierarchy, M: Mixing> Neal8<H, M> {
    pub fn params(prototype: H, mixing: M) -> Neal8Params<H, M> {
        Neal8Params {
            prototype,
            mixing,
            burnin: 0,
            iterations: 1000,
            seed: DEFAULT_SEED,
            init_clusters: 3,
            n_aux: DEFAULT_N_AUX,
        }
    }
}

impl<H: Hierarchy, M: Mixing> Neal8Params<H, M> {
    pub fn burnin(mut self, burnin: usize) -> Self {
        self.burnin = burnin;
        self
    }

    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn init_clusters(mut self, init_clusters: usize) -> Self {
        self.init_clusters = init_clusters;
        self
    }

    /// Number of auxiliary blocks `m ≥ 1`.
    pub fn n_aux(mut self, n_aux: usize) -> Self {
        self.n_aux = n_aux;
        self
    }

    pub fn build(self) -> Result<Neal8<H, M>> {
        if self.iterations == 0 {
            return Err(Error::InvalidParameter(
                "iterations must be > 0".to_string(),
            ));
        }
        if self.init_clusters == 0 {
            return Err(Error::InvalidParameter(
                "initial cluster count must be > 0".to_string(),
            ));
        }
        if self.n_aux == 0 {
            return Err(Error::InvalidParameter(
                "auxiliary block count must be > 0".to_string(),
            ));
        }
        Ok(Neal8 {
            prototype: self.prototype,
            mixing: self.mixing,
            burnin: self.burnin,
            iterations: self.iterations,
            seed: self.seed,
            init_clusters: self.init_clusters,
            n_aux: self.n_aux,
            engine: None,
        })
    }
}

impl<H: Hierarchy, M: Mixing> Neal8<H, M> {
    /// Runs the chain over `data`, emitting one snapshot per kept
    /// iteration into `collector`.
    pub fn run<C: Collector>(&mut self, data: ArrayView2<f64>, collector: &mut C) -> Result<()> {
        let mut engine = Engine::new(
            self.prototype.clone(),
            self.mixing.clone(),
            data.to_owned(),
            self.init_clusters,
            self.seed,
        )?;
        // the auxiliary pool is allocated once and reused every sweep
        let mut aux: Vec<H> = (0..self.n_aux).map(|_| engine.prototype.fresh()).collect();
        run_chain(
            &mut engine,
            self.burnin,
            self.iterations,
            collector,
            |eng| Self::sample_allocations(eng, &mut aux),
        )?;
        self.engine = Some(engine);
        Ok(())
    }

    /// One auxiliary-variable sweep over the observations in natural
    /// order.
    fn sample_allocations(engine: &mut Engine<H, M>, aux: &mut [H]) -> Result<()> {
        let n = engine.n_data();
        let n_aux = aux.len();
        let log_n_aux = (n_aux as f64).ln();
        for i in 0..n {
            let datum = engine.data.row(i).to_owned();
            let k_old = engine.allocations[i];
            let singleton = engine.clusters[k_old].card() <= 1;
            if singleton {
                // recycle the singleton's state into slot 0
                aux[0].set_cluster_state(&engine.clusters[k_old].cluster_state())?;
            }
            engine.detach_datum(i);
            let first_fresh = if singleton { 1 } else { 0 };
            for slot in aux.iter_mut().skip(first_fresh) {
                slot.draw(&mut engine.rng)?;
            }

            let n_clust = engine.n_clusters();
            let mut log_weights = Array1::<f64>::zeros(n_clust + n_aux);
            for (k, cluster) in engine.clusters.iter().enumerate() {
                log_weights[k] = engine
                    .mixing
                    .mass_existing_cluster(cluster.card(), n - 1, true, true)
                    + cluster.like_lpdf(datum.view());
            }
            let new_mass = engine.mixing.mass_new_cluster(n_clust, n - 1, true, true);
            for (j, slot) in aux.iter().enumerate() {
                log_weights[n_clust + j] = new_mass + slot.like_lpdf(datum.view()) - log_n_aux;
            }

            let choice = categorical_log_weights_rng(log_weights.view(), &mut engine.rng);
            if choice >= n_clust {
                // promote the chosen auxiliary block to a real cluster
                let mut cluster = aux[choice - n_clust].fresh();
                cluster.add_datum(i, datum.view());
                engine.clusters.push(cluster);
                engine.allocations[i] = n_clust;
            } else {
                engine.attach_datum(i, choice);
            }
        }
        Ok(())
    }

    /// Posterior-predictive log-density of every grid row under every
    /// collected snapshot; the marginal new-cluster component averages
    /// `n_aux` fresh prior draws, consuming the run's generator.
    pub fn eval_lpdf<C: Collector>(
        &mut self,
        grid: ArrayView2<f64>,
        collector: &mut C,
    ) -> Result<Array2<f64>> {
        let n_aux = self.n_aux;
        let engine = self.engine.as_mut().ok_or_else(|| {
            Error::InvalidParameter("eval_lpdf requires a completed run".to_string())
        })?;
        let n_data = engine.data.nrows();
        let prototype = engine.prototype.clone();
        let rng = &mut engine.rng;
        let marginal = |g: ArrayView2<f64>| -> Result<Array1<f64>> {
            let mut draws = Array2::<f64>::zeros((n_aux, g.nrows()));
            for a in 0..n_aux {
                let mut temp = prototype.fresh();
                temp.draw(&mut *rng)?;
                draws.row_mut(a).assign(&temp.like_lpdf_grid(g));
            }
            Ok(Array1::from(
                (0..g.nrows())
                    .map(|gi| log_sum_exp(draws.column(gi)) - (n_aux as f64).ln())
                    .collect::<Vec<_>>(),
            ))
        };
        eval_chain_lpdf(
            &prototype,
            &engine.mixing,
            n_data,
            grid,
            collector,
            marginal,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::MemoryCollector;
    use crate::hierarchies::{NnigHierarchy, NnigHypers, NnigPrior};
    use crate::mixings::{DirichletProcess, DpPrior};
    use crate::Neal2;
    use ndarray::array;

    fn two_bump_data() -> Array2<f64> {
        array![[1.0], [1.1], [0.9], [5.0], [5.2], [4.8]]
    }

    fn nnig_prototype() -> NnigHierarchy {
        NnigHierarchy::new(NnigPrior::Fixed(NnigHypers {
            mean: 0.0,
            var_scaling: 0.1,
            shape: 2.0,
            scale: 2.0,
        }))
        .unwrap()
    }

    fn dp_mixing() -> DirichletProcess {
        DirichletProcess::new(DpPrior::Fixed { total_mass: 1.0 }).unwrap()
    }

    fn mean_cluster_count(chain: &[bnpmix::ChainState]) -> f64 {
        chain
            .iter()
            .map(|s| s.cluster_states.len() as f64)
            .sum::<f64>()
            / chain.len() as f64
    }

    fn share_with_two_clusters(chain: &[bnpmix::ChainState]) -> f64 {
        chain
            .iter()
            .filter(|s| s.cluster_states.len() == 2)
            .count() as f64
            / chain.len() as f64
    }

    #[test]
    fn build_rejects_zero_auxiliary_blocks() {
        let params = Neal8::params(nnig_prototype(), dp_mixing()).n_aux(0);
        assert!(params.build().is_err());
    }

    #[test]
    fn partition_invariants_hold_across_iterations() {
        let mut engine = Engine::new(
            nnig_prototype(),
            dp_mixing(),
            two_bump_data(),
            3,
            DEFAULT_SEED,
        )
        .unwrap();
        let mut aux: Vec<_> = (0..3).map(|_| engine.prototype.fresh()).collect();
        for _ in 0..50 {
            Neal8::<NnigHierarchy, DirichletProcess>::sample_allocations(&mut engine, &mut aux)
                .unwrap();
            engine.sample_unique_values().unwrap();
            engine.update_mixing().unwrap();
            engine.update_hypers().unwrap();
            engine.assert_invariants();
        }
    }

    #[test]
    fn auxiliary_sampler_agrees_with_the_collapsed_one() {
        let mut neal2 = Neal2::params(nnig_prototype(), dp_mixing())
            .burnin(500)
            .iterations(1000)
            .seed(42)
            .build()
            .unwrap();
        let mut chain2 = MemoryCollector::new();
        neal2.run(two_bump_data().view(), &mut chain2).unwrap();

        let mut neal8 = Neal8::params(nnig_prototype(), dp_mixing())
            .burnin(500)
            .iterations(1000)
            .n_aux(3)
            .seed(42)
            .build()
            .unwrap();
        let mut chain8 = MemoryCollector::new();
        neal8.run(two_bump_data().view(), &mut chain8).unwrap();

        let mean2 = mean_cluster_count(chain2.chain());
        let mean8 = mean_cluster_count(chain8.chain());
        assert!(
            (mean2 - mean8).abs() < 0.35,
            "posterior mean K differs: {} vs {}",
            mean2,
            mean8
        );
        let share2 = share_with_two_clusters(chain2.chain());
        let share8 = share_with_two_clusters(chain8.chain());
        assert!(
            (share2 - share8).abs() < 0.15,
            "P(K = 2) differs: {} vs {}",
            share2,
            share8
        );
    }

    #[test]
    fn fixed_seed_reproduces_the_chain_bit_for_bit() {
        let mut chains = Vec::new();
        for _ in 0..2 {
            let mut sampler = Neal8::params(nnig_prototype(), dp_mixing())
                .burnin(50)
                .iterations(100)
                .seed(99)
                .build()
                .unwrap();
            let mut collector = MemoryCollector::new();
            sampler.run(two_bump_data().view(), &mut collector).unwrap();
            chains.push(serde_json::to_vec(collector.chain()).unwrap());
        }
        assert_eq!(chains[0], chains[1]);
    }

    #[test]
    fn multivariate_hierarchy_runs_end_to_end() {
        use crate::hierarchies::{NnwHierarchy, NnwPrior};
        use ndarray::Array2;

        let data = array![
            [0.1, -0.2],
            [-0.3, 0.1],
            [0.2, 0.3],
            [4.1, 3.8],
            [3.9, 4.2],
            [4.2, 4.0],
        ];
        let prototype = NnwHierarchy::new(NnwPrior::Fixed {
            mean: array![0.0, 0.0],
            var_scaling: 0.1,
            scale: Array2::eye(2),
            deg_free: 4.0,
        })
        .unwrap();
        let mut sampler = Neal8::params(prototype, dp_mixing())
            .burnin(100)
            .iterations(200)
            .seed(42)
            .build()
            .unwrap();
        let mut collector = MemoryCollector::new();
        sampler.run(data.view(), &mut collector).unwrap();
        assert_eq!(collector.len(), 200);

        // two well-separated blobs dominate the posterior over K
        let mean_k = mean_cluster_count(collector.chain());
        assert!(
            mean_k > 1.2 && mean_k < 3.5,
            "posterior mean K out of range: {}",
            mean_k
        );
    }

    #[test]
    fn density_evaluation_covers_the_chain() {
        let mut sampler = Neal8::params(nnig_prototype(), dp_mixing())
            .burnin(100)
            .iterations(150)
            .seed(5)
            .build()
            .unwrap();
        let mut collector = MemoryCollector::new();
        sampler.run(two_bump_data().view(), &mut collector).unwrap();

        let grid = array![[0.0], [1.0], [3.0], [5.0]];
        let lpdf = sampler.eval_lpdf(grid.view(), &mut collector).unwrap();
        assert_eq!(lpdf.shape(), &[150, 4]);
        assert!(lpdf.iter().all(|v| v.is_finite()));
    }
}
