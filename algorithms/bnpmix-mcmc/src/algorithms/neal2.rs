use ndarray::{Array1, Array2, ArrayView2};

use bnpmix::error::{Error, Result};
use bnpmix::rng::DEFAULT_SEED;
use bnpmix::stats::categorical_log_weights_rng;
use bnpmix::traits::{Collector, Hierarchy, Mixing};

use super::engine::Engine;
use super::marginal::{eval_chain_lpdf, run_chain};

/// Collapsed marginal Gibbs sampler (Neal, 2000, Algorithm 2).
///
/// Reallocation weighs every existing cluster by its mixing mass times
/// the cluster likelihood, and a new cluster by the new-cluster mass
/// times the prior predictive; requires a conjugate hierarchy.
///
/// ```rust
/// extern crate openblas_src;
/// use bnpmix_mcmc::{
///     DirichletProcess, DpPrior, MemoryCollector, Neal2, NnigHierarchy, NnigHypers, NnigPrior,
/// };
/// use ndarray::array;
///
/// let data = array![[1.0], [1.1], [0.9], [5.0], [5.2], [4.8]];
/// let hierarchy = NnigHierarchy::new(NnigPrior::Fixed(NnigHypers {
///     mean: 0.0,
///     var_scaling: 0.1,
///     shape: 2.0,
///     scale: 2.0,
/// }))
/// .unwrap();
/// let mixing = DirichletProcess::new(DpPrior::Fixed { total_mass: 1.0 }).unwrap();
///
/// let mut sampler = Neal2::params(hierarchy, mixing)
///     .burnin(100)
///     .iterations(200)
///     .seed(42)
///     .build()
///     .unwrap();
/// let mut collector = MemoryCollector::new();
/// sampler.run(data.view(), &mut collector).unwrap();
/// assert_eq!(collector.len(), 200);
/// ```
pub struct Neal2<H: Hierarchy, M: Mixing> {
    prototype: H,
    mixing: M,
    burnin: usize,
    iterations: usize,
    seed: u64,
    init_clusters: usize,
    engine: Option<Engine<H, M>>,
}

/// Validated-on-build configuration for [`Neal2`].
pub struct Neal2Params<H: Hierarchy, M: Mixing> {
    prototype: H,
    mixing: M,
    burnin: usize,
    iterations: usize,
    seed: u64,
    init_clusters: usize,
}

impl<H: Hierarchy, M: Mixing> Neal2<H, M> {
    pub fn params(prototype: H, mixing: M) -> Neal2Params<H, M> {
        Neal2Params {
            prototype,
            mixing,
            burnin: 0,
            iterations: 1000,
            seed: DEFAULT_SEED,
            init_clusters: 3,
        }
    }
}

impl<H: Hierarchy, M: Mixing> Neal2Params<H, M> {
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

    pub fn build(self) -> Result<Neal2<H, M>> {
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
        Ok(Neal2 {
            prototype: self.prototype,
            mixing: self.mixing,
            burnin: self.burnin,
            iterations: self.iterations,
            seed: self.seed,
            init_clusters: self.init_clusters,
            engine: None,
        })
    }
}

impl<H: Hierarchy, M: Mixing> Neal2<H, M> {
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
        run_chain(
            &mut engine,
            self.burnin,
            self.iterations,
            collector,
            Self::sample_allocations,
        )?;
        self.engine = Some(engine);
        Ok(())
    }

    /// One collapsed sweep over the observations in natural order.
    fn sample_allocations(engine: &mut Engine<H, M>) -> Result<()> {
        let n = engine.n_data();
        for i in 0..n {
            let datum = engine.data.row(i).to_owned();
            engine.detach_datum(i);
            let n_clust = engine.n_clusters();
            let mut log_weights = Array1::<f64>::zeros(n_clust + 1);
            for (k, cluster) in engine.clusters.iter().enumerate() {
                log_weights[k] = engine
                    .mixing
                    .mass_existing_cluster(cluster.card(), n - 1, true, true)
                    + cluster.like_lpdf(datum.view());
            }
            log_weights[n_clust] = engine.mixing.mass_new_cluster(n_clust, n - 1, true, true)
                + engine.prototype.marg_lpdf(datum.view());
            let choice = categorical_log_weights_rng(log_weights.view(), &mut engine.rng);
            if choice == n_clust {
                // materialize a new cluster from the prototype, with its
                // state drawn from the posterior given this datum alone
                let mut cluster = engine.prototype.fresh();
                cluster.add_datum(i, datum.view());
                cluster.sample_given_data(&mut engine.rng)?;
                engine.clusters.push(cluster);
                engine.allocations[i] = n_clust;
            } else {
                engine.attach_datum(i, choice);
            }
        }
        Ok(())
    }

    /// Posterior-predictive log-density of every grid row under every
    /// collected snapshot, replayed through `collector`; the marginal
    /// new-cluster component is the prior predictive under the current
    /// hyperparameters.
    pub fn eval_lpdf<C: Collector>(
        &self,
        grid: ArrayView2<f64>,
        collector: &mut C,
    ) -> Result<Array2<f64>> {
        let engine = self.engine.as_ref().ok_or_else(|| {
            Error::InvalidParameter("eval_lpdf requires a completed run".to_string())
        })?;
        let prototype = &engine.prototype;
        eval_chain_lpdf(
            prototype,
            &engine.mixing,
            engine.n_data(),
            grid,
            collector,
            |g| Ok(prototype.marg_lpdf_grid(g)),
        )
    }
}
