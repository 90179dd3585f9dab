//! Capability contracts consumed by the samplers.
//!
//! A mixture model is assembled from three orthogonal plug-ins: a
//! [`Hierarchy`] (the per-cluster observation/parameter family), a
//! [`Mixing`] (the prior over partitions) and a [`Collector`] (the sink
//! and replay source for per-iteration snapshots). The algorithm crates
//! are generic over all three.

use std::collections::BTreeSet;

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::Rng;

use crate::error::Result;
use crate::state::{ChainState, ClusterState, MixingState};

/// Per-cluster model: likelihood, prior, sufficient statistics.
///
/// One value of the implementing type is a single cluster (or the
/// family prototype used to materialize new clusters). Hyperparameters
/// are shared across all clusters of the family through a
/// reference-counted bundle, so a hyperparameter resample through any
/// one of them is observed by all.
pub trait Hierarchy: Clone {
    /// Short family identifier used in logs.
    fn id(&self) -> &'static str;

    /// Rebuilds the sampled state from the current hyperparameters and
    /// clears the sufficient statistics.
    fn initialize(&mut self) -> Result<()>;

    /// Resamples the state from the prior centering distribution.
    fn draw<R: Rng>(&mut self, rng: &mut R) -> Result<()>;

    /// Resamples the state from the posterior given the currently
    /// accumulated sufficient statistics.
    fn sample_given_data<R: Rng>(&mut self, rng: &mut R) -> Result<()>;

    /// Registers observation `idx` with value `datum`: increments the
    /// cardinality and updates the sufficient statistics.
    fn add_datum(&mut self, idx: usize, datum: ArrayView1<f64>);

    /// Inverse of [`Hierarchy::add_datum`]; the sufficient statistics
    /// afterwards equal those recomputed from the remaining data.
    fn remove_datum(&mut self, idx: usize, datum: ArrayView1<f64>);

    /// Number of observations currently assigned to this cluster.
    fn card(&self) -> usize;

    /// Indices of the observations currently assigned to this cluster.
    fn data_indices(&self) -> &BTreeSet<usize>;

    /// Log-likelihood of one observation under the sampled state.
    fn like_lpdf(&self, datum: ArrayView1<f64>) -> f64;

    /// Vectorized [`Hierarchy::like_lpdf`] over the rows of `grid`.
    fn like_lpdf_grid(&self, grid: ArrayView2<f64>) -> Array1<f64> {
        Array1::from(
            grid.outer_iter()
                .map(|row| self.like_lpdf(row))
                .collect::<Vec<_>>(),
        )
    }

    /// Prior-predictive log-density of one observation, with the state
    /// integrated out under the current hyperparameters. Required by
    /// marginal algorithms; only conjugate families can provide it.
    fn marg_lpdf(&self, datum: ArrayView1<f64>) -> f64;

    /// Vectorized [`Hierarchy::marg_lpdf`] over the rows of `grid`.
    fn marg_lpdf_grid(&self, grid: ArrayView2<f64>) -> Array1<f64> {
        Array1::from(
            grid.outer_iter()
                .map(|row| self.marg_lpdf(row))
                .collect::<Vec<_>>(),
        )
    }

    /// Resamples the shared hyperparameters given the states of all
    /// current clusters. A no-op for fixed-hyperparameter priors.
    fn update_hypers<R: Rng>(&mut self, states: &[ClusterState], rng: &mut R) -> Result<()>;

    /// Snapshot of the sampled state plus cardinality.
    fn cluster_state(&self) -> ClusterState;

    /// Restores the sampled state (and cardinality) from a snapshot.
    fn set_cluster_state(&mut self, state: &ClusterState) -> Result<()>;

    /// Clone keeping the sampled state and the shared hyperparameter
    /// bundle, with the sufficient statistics reset.
    fn fresh(&self) -> Self;

    /// Whether the family consumes covariates. Covariate-dependent
    /// families are not part of this crate; drivers may branch on it.
    fn is_dependent(&self) -> bool {
        false
    }
}

/// Prior over partitions: mass for joining an existing cluster versus
/// spawning a new one, plus its own hyperparameter update.
///
/// `n_rest` is the number of observations other than the one currently
/// being reassigned. With `propto` the shared denominator is dropped;
/// with `log` the value is returned in log-space. The samplers pass
/// `log = propto = true` and normalize through the softmax.
pub trait Mixing: Clone {
    /// Short identifier used in logs.
    fn id(&self) -> &'static str;

    /// Mass of joining an existing cluster of cardinality `card`.
    fn mass_existing_cluster(&self, card: usize, n_rest: usize, log: bool, propto: bool) -> f64;

    /// Mass of spawning a new cluster given `n_clust` existing ones.
    fn mass_new_cluster(&self, n_clust: usize, n_rest: usize, log: bool, propto: bool) -> f64;

    /// Resamples the mixing's own hyperparameters from the current
    /// partition (cluster cardinalities and total count). May be a
    /// no-op.
    fn update_state<R: Rng>(&mut self, cards: &[usize], n: usize, rng: &mut R) -> Result<()>;

    /// Snapshot of the mixing state.
    fn mixing_state(&self) -> MixingState;

    /// Restores the mixing state from a snapshot.
    fn set_mixing_state(&mut self, state: &MixingState) -> Result<()>;

    /// Whether the prior consumes covariates.
    fn is_dependent(&self) -> bool {
        false
    }
}

/// Append-only sink and replayable source for chain snapshots.
///
/// Ordering is preserved and no record is dropped; a write failure
/// aborts the run. `start` acquires the underlying resource and
/// `finish` releases it on every exit path.
pub trait Collector {
    fn start(&mut self) -> Result<()>;

    fn append(&mut self, state: &ChainState) -> Result<()>;

    fn finish(&mut self) -> Result<()>;

    /// Rewinds the replay cursor to the first stored snapshot.
    fn begin_reading(&mut self) -> Result<()>;

    /// Returns the next snapshot, or `None` once the chain is
    /// exhausted.
    fn next_state(&mut self) -> Result<Option<ChainState>>;
}
