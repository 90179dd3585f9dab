use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use ndarray::ArrayView1;
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::{Distribution, Normal};

use bnpmix::error::{Error, Result};
use bnpmix::state::{ClusterParams, ClusterState};
use bnpmix::stats::{inv_gamma_rng, normal_lpdf, student_t_lpdf};
use bnpmix::traits::Hierarchy;

/// Hyperparameters of the Normal–Normal–inverse-Gamma family.
///
/// The centering distribution on a cluster's `(mean, var)` is
/// `var ~ InvGamma(shape, scale)`, `mean | var ~ N(mean, var / var_scaling)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NnigHypers {
    pub mean: f64,
    pub var_scaling: f64,
    pub shape: f64,
    pub scale: f64,
}

/// Prior configuration for the NNIG family.
#[derive(Debug, Clone, PartialEq)]
pub enum NnigPrior {
    /// Hyperparameters held fixed for the whole run.
    Fixed(NnigHypers),
    /// Gaussian hyperprior on the centering mean; the remaining
    /// hyperparameters stay fixed.
    NormalMean {
        mean_mean: f64,
        mean_var: f64,
        var_scaling: f64,
        shape: f64,
        scale: f64,
    },
}

/// Univariate conjugate hierarchy: normal likelihood, normal prior on
/// the mean, inverse-gamma prior on the variance.
#[derive(Debug, Clone)]
pub struct NnigHierarchy {
    prior: NnigPrior,
    hypers: Rc<RefCell<NnigHypers>>,
    state_mean: f64,
    state_var: f64,
    data_sum: f64,
    data_sum_squares: f64,
    card: usize,
    data_idx: BTreeSet<usize>,
}

impl NnigHierarchy {
    pub fn new(prior: NnigPrior) -> Result<Self> {
        let hypers = match &prior {
            NnigPrior::Fixed(hypers) => {
                Self::validate(hypers.var_scaling, hypers.shape, hypers.scale)?;
                hypers.clone()
            }
            NnigPrior::NormalMean {
                mean_mean,
                mean_var,
                var_scaling,
                shape,
                scale,
            } => {
                Self::validate(*var_scaling, *shape, *scale)?;
                if *mean_var <= 0.0 {
                    return Err(Error::InvalidParameter(
                        "centering-mean hyperprior variance must be > 0".to_string(),
                    ));
                }
                NnigHypers {
                    mean: *mean_mean,
                    var_scaling: *var_scaling,
                    shape: *shape,
                    scale: *scale,
                }
            }
        };
        let mut hier = NnigHierarchy {
            prior,
            hypers: Rc::new(RefCell::new(hypers)),
            state_mean: 0.0,
            state_var: 1.0,
            data_sum: 0.0,
            data_sum_squares: 0.0,
            card: 0,
            data_idx: BTreeSet::new(),
        };
        hier.initialize()?;
        Ok(hier)
    }

    fn validate(var_scaling: f64, shape: f64, scale: f64) -> Result<()> {
        if var_scaling <= 0.0 {
            return Err(Error::InvalidParameter(
                "variance-scaling parameter must be > 0".to_string(),
            ));
        }
        if shape <= 0.0 {
            return Err(Error::InvalidParameter(
                "shape parameter must be > 0".to_string(),
            ));
        }
        if scale <= 0.0 {
            return Err(Error::InvalidParameter(
                "scale parameter must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Conjugate normal/inverse-gamma update from the accumulated
    /// sufficient statistics.
    fn posterior_hypers(&self) -> NnigHypers {
        let hypers = self.hypers.borrow();
        if self.card == 0 {
            return hypers.clone();
        }
        let n = self.card as f64;
        let ybar = self.data_sum / n;
        let scatter = self.data_sum_squares - n * ybar * ybar;
        let var_scaling = hypers.var_scaling + n;
        NnigHypers {
            mean: (hypers.var_scaling * hypers.mean + self.data_sum) / var_scaling,
            var_scaling,
            shape: hypers.shape + 0.5 * n,
            scale: hypers.scale
                + 0.5 * scatter
                + 0.5 * (n * hypers.var_scaling / var_scaling) * (ybar - hypers.mean).powi(2),
        }
    }

    fn sample_state<R: Rng>(&mut self, params: &NnigHypers, rng: &mut R) -> Result<()> {
        let var = inv_gamma_rng(params.shape, params.scale, rng)?;
        let sd = (var / params.var_scaling).sqrt();
        let mean = Normal::new(params.mean, sd)
            .map_err(|_| Error::InvalidParameter(format!("normal(sd = {})", sd)))?
            .sample(rng);
        self.state_mean = mean;
        self.state_var = var;
        Ok(())
    }
}

impl Hierarchy for NnigHierarchy {
    fn id(&self) -> &'static str {
        "NNIG"
    }

    fn initialize(&mut self) -> Result<()> {
        let hypers = self.hypers.borrow();
        self.state_mean = hypers.mean;
        self.state_var = hypers.scale / (hypers.shape + 1.0);
        drop(hypers);
        self.data_sum = 0.0;
        self.data_sum_squares = 0.0;
        self.card = 0;
        self.data_idx = BTreeSet::new();
        Ok(())
    }

    fn draw<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        let params = self.hypers.borrow().clone();
        self.sample_state(&params, rng)
    }

    fn sample_given_data<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        let params = self.posterior_hypers();
        self.sample_state(&params, rng)
    }

    fn add_datum(&mut self, idx: usize, datum: ArrayView1<f64>) {
        let y = datum[0];
        let inserted = self.data_idx.insert(idx);
        debug_assert!(inserted, "datum already assigned to this cluster");
        self.card += 1;
        self.data_sum += y;
        self.data_sum_squares += y * y;
    }

    fn remove_datum(&mut self, idx: usize, datum: ArrayView1<f64>) {
        let y = datum[0];
        let removed = self.data_idx.remove(&idx);
        debug_assert!(removed, "datum was not assigned to this cluster");
        self.card -= 1;
        self.data_sum -= y;
        self.data_sum_squares -= y * y;
    }

    fn card(&self) -> usize {
        self.card
    }

    fn data_indices(&self) -> &BTreeSet<usize> {
        &self.data_idx
    }

    fn like_lpdf(&self, datum: ArrayView1<f64>) -> f64 {
        normal_lpdf(datum[0], self.state_mean, self.state_var)
    }

    fn marg_lpdf(&self, datum: ArrayView1<f64>) -> f64 {
        let hypers = self.hypers.borrow();
        let sigma = (hypers.scale * (hypers.var_scaling + 1.0)
            / (hypers.shape * hypers.var_scaling))
            .sqrt();
        student_t_lpdf(datum[0], 2.0 * hypers.shape, hypers.mean, sigma)
    }

    fn update_hypers<R: Rng>(&mut self, states: &[ClusterState], rng: &mut R) -> Result<()> {
        match self.prior {
            NnigPrior::Fixed(_) => Ok(()),
            NnigPrior::NormalMean {
                mean_mean,
                mean_var,
                ..
            } => {
                let var_scaling = self.hypers.borrow().var_scaling;
                let mut precision = 1.0 / mean_var;
                let mut weighted = mean_mean / mean_var;
                for state in states {
                    match state.params {
                        ClusterParams::UniLs { mean, var } => {
                            precision += var_scaling / var;
                            weighted += var_scaling * mean / var;
                        }
                        _ => return Err(Error::StateMismatch { expected: "NNIG" }),
                    }
                }
                let post_mean = weighted / precision;
                let post_sd = (1.0 / precision).sqrt();
                let draw = Normal::new(post_mean, post_sd)
                    .map_err(|_| Error::InvalidParameter(format!("normal(sd = {})", post_sd)))?
                    .sample(rng);
                self.hypers.borrow_mut().mean = draw;
                Ok(())
            }
        }
    }

    fn cluster_state(&self) -> ClusterState {
        ClusterState {
            cardinality: self.card,
            params: ClusterParams::UniLs {
                mean: self.state_mean,
                var: self.state_var,
            },
        }
    }

    fn set_cluster_state(&mut self, state: &ClusterState) -> Result<()> {
        match state.params {
            ClusterParams::UniLs { mean, var } => {
                self.state_mean = mean;
                self.state_var = var;
                self.card = state.cardinality;
                Ok(())
            }
            _ => Err(Error::StateMismatch { expected: "NNIG" }),
        }
    }

    fn fresh(&self) -> Self {
        let mut out = self.clone();
        out.data_sum = 0.0;
        out.data_sum_squares = 0.0;
        out.card = 0;
        out.data_idx = BTreeSet::new();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use bnpmix::rng;
    use ndarray::array;

    fn test_prior() -> NnigPrior {
        NnigPrior::Fixed(NnigHypers {
            mean: 5.0,
            var_scaling: 0.1,
            shape: 2.0,
            scale: 2.0,
        })
    }

    #[test]
    fn rejects_nonpositive_hyperparameters() {
        let prior = NnigPrior::Fixed(NnigHypers {
            mean: 0.0,
            var_scaling: -1.0,
            shape: 2.0,
            scale: 2.0,
        });
        assert!(NnigHierarchy::new(prior).is_err());
    }

    #[test]
    fn draw_moves_the_state() {
        let hier = NnigHierarchy::new(test_prior()).unwrap();
        let mut rng = rng::seeded(42);
        let mut drawn = hier.fresh();
        drawn.draw(&mut rng).unwrap();
        assert_ne!(hier.cluster_state(), drawn.cluster_state());
    }

    #[test]
    fn sample_given_data_tracks_the_datum() {
        let hier = NnigHierarchy::new(test_prior()).unwrap();
        let mut rng = rng::seeded(42);
        let mut posterior = hier.fresh();
        posterior.add_datum(0, array![4.5].view());
        posterior.sample_given_data(&mut rng).unwrap();
        assert_ne!(hier.cluster_state(), posterior.cluster_state());
    }

    #[test]
    fn add_remove_roundtrip_restores_sufficient_stats() {
        let mut hier = NnigHierarchy::new(test_prior()).unwrap();
        hier.add_datum(0, array![1.25].view());
        hier.add_datum(1, array![-0.5].view());
        let sum = hier.data_sum;
        let sum_squares = hier.data_sum_squares;

        hier.add_datum(2, array![3.75].view());
        hier.remove_datum(2, array![3.75].view());

        assert_eq!(hier.card(), 2);
        assert_eq!(hier.data_indices().len(), 2);
        assert_abs_diff_eq!(hier.data_sum, sum, epsilon = 1e-12);
        assert_abs_diff_eq!(hier.data_sum_squares, sum_squares, epsilon = 1e-12);
    }

    #[test]
    fn stats_match_recomputation_from_scratch() {
        let mut hier = NnigHierarchy::new(test_prior()).unwrap();
        let data = [1.0, 1.1, 0.9, 5.0];
        for (i, y) in data.iter().enumerate() {
            hier.add_datum(i, array![*y].view());
        }
        hier.remove_datum(1, array![1.1].view());
        let kept = [1.0, 0.9, 5.0];
        assert_abs_diff_eq!(hier.data_sum, kept.iter().sum::<f64>(), epsilon = 1e-12);
        assert_abs_diff_eq!(
            hier.data_sum_squares,
            kept.iter().map(|y| y * y).sum::<f64>(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn posterior_hypers_shrink_toward_data() {
        let mut hier = NnigHierarchy::new(test_prior()).unwrap();
        for (i, y) in [1.0, 1.2, 0.8].iter().enumerate() {
            hier.add_datum(i, array![*y].view());
        }
        let post = hier.posterior_hypers();
        assert_abs_diff_eq!(post.var_scaling, 3.1, epsilon = 1e-12);
        assert_abs_diff_eq!(post.shape, 3.5, epsilon = 1e-12);
        // posterior mean sits between the prior mean and the sample mean
        assert!(post.mean > 1.0 && post.mean < 5.0);
    }

    #[test]
    fn cluster_state_roundtrip() {
        let mut hier = NnigHierarchy::new(test_prior()).unwrap();
        let mut rng = rng::seeded(7);
        hier.draw(&mut rng).unwrap();
        let state = hier.cluster_state();
        let mut other = hier.fresh();
        other.set_cluster_state(&state).unwrap();
        assert_eq!(other.cluster_state(), state);
    }

    #[test]
    fn normal_mean_hyperprior_resamples_the_centering_mean() {
        let prior = NnigPrior::NormalMean {
            mean_mean: 0.0,
            mean_var: 10.0,
            var_scaling: 0.1,
            shape: 2.0,
            scale: 2.0,
        };
        let mut hier = NnigHierarchy::new(prior).unwrap();
        let mut rng = rng::seeded(3);
        let states = vec![
            ClusterState {
                cardinality: 5,
                params: ClusterParams::UniLs {
                    mean: 4.0,
                    var: 1.0,
                },
            },
            ClusterState {
                cardinality: 3,
                params: ClusterParams::UniLs {
                    mean: 6.0,
                    var: 1.0,
                },
            },
        ];
        let before = hier.hypers.borrow().mean;
        hier.update_hypers(&states, &mut rng).unwrap();
        let after = hier.hypers.borrow().mean;
        assert_ne!(before, after);
    }

    #[test]
    fn fixed_prior_keeps_hypers() {
        let mut hier = NnigHierarchy::new(test_prior()).unwrap();
        let mut rng = rng::seeded(3);
        let before = hier.hypers.borrow().clone();
        hier.update_hypers(&[], &mut rng).unwrap();
        assert_eq!(*hier.hypers.borrow(), before);
    }

    #[test]
    fn hypers_are_shared_across_fresh_clones() {
        let prior = NnigPrior::NormalMean {
            mean_mean: 0.0,
            mean_var: 10.0,
            var_scaling: 0.1,
            shape: 2.0,
            scale: 2.0,
        };
        let mut proto = NnigHierarchy::new(prior).unwrap();
        let clone = proto.fresh();
        let mut rng = rng::seeded(5);
        let states = vec![ClusterState {
            cardinality: 1,
            params: ClusterParams::UniLs {
                mean: 2.0,
                var: 0.5,
            },
        }];
        proto.update_hypers(&states, &mut rng).unwrap();
        assert_eq!(
            proto.hypers.borrow().mean,
            clone.hypers.borrow().mean
        );
    }
}
