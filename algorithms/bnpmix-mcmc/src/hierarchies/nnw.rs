use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand::Rng;

use bnpmix::error::{Error, Result};
use bnpmix::state::{ClusterParams, ClusterState, MatrixData, VectorData};
use bnpmix::stats::{
    gamma_rng, inv_wishart_rng, inverse_spd, multi_normal_prec_lpdf, multi_normal_prec_rng,
    multi_normal_rng, multi_student_t_invscale_chol_lpdf, spd_cholesky_upper, wishart_rng,
};
use bnpmix::traits::Hierarchy;

/// Hyperparameters of the Normal–Normal–Wishart family, with the
/// write-through caches of the scale matrix: its inverse, the upper
/// Cholesky factor of the inverse and the inverse's log-determinant.
///
/// The centering distribution on a cluster's `(μ, Λ)` is
/// `Λ ~ Wishart(deg_free, scale)`,
/// `μ | Λ ~ N(mean, (var_scaling · Λ)⁻¹)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NnwHypers {
    mean: Array1<f64>,
    var_scaling: f64,
    deg_free: f64,
    scale: Array2<f64>,
    scale_inv: Array2<f64>,
    scale_inv_chol: Array2<f64>,
    scale_inv_logdet: f64,
}

impl NnwHypers {
    pub fn new(
        mean: Array1<f64>,
        var_scaling: f64,
        scale: Array2<f64>,
        deg_free: f64,
    ) -> Result<Self> {
        let dim = mean.len();
        if scale.nrows() != dim {
            return Err(Error::DimensionMismatch {
                name: "scale",
                expected: dim,
                actual: scale.nrows(),
            });
        }
        if var_scaling <= 0.0 {
            return Err(Error::InvalidParameter(
                "variance-scaling parameter must be > 0".to_string(),
            ));
        }
        if deg_free <= dim as f64 - 1.0 {
            return Err(Error::DegreesOfFreedom {
                name: "centering scale",
                min: dim as f64 - 1.0,
                value: deg_free,
            });
        }
        let mut hypers = NnwHypers {
            mean,
            var_scaling,
            deg_free,
            scale: Array2::zeros((dim, dim)),
            scale_inv: Array2::zeros((dim, dim)),
            scale_inv_chol: Array2::zeros((dim, dim)),
            scale_inv_logdet: 0.0,
        };
        hypers.set_scale(scale)?;
        Ok(hypers)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn var_scaling(&self) -> f64 {
        self.var_scaling
    }

    pub fn deg_free(&self) -> f64 {
        self.deg_free
    }

    pub fn scale(&self) -> &Array2<f64> {
        &self.scale
    }

    fn scale_inv(&self) -> &Array2<f64> {
        &self.scale_inv
    }

    /// Replaces the scale matrix and refreshes every cached derivative.
    fn set_scale(&mut self, scale: Array2<f64>) -> Result<()> {
        let scale_inv = inverse_spd(scale.view(), "centering scale")?;
        let scale_inv_chol = spd_cholesky_upper(scale_inv.view(), "centering scale inverse")?;
        self.scale_inv_logdet = 2.0 * scale_inv_chol.diag().mapv(f64::ln).sum();
        self.scale_inv = scale_inv;
        self.scale_inv_chol = scale_inv_chol;
        self.scale = scale;
        Ok(())
    }
}

/// Prior configuration for the NNW family.
#[derive(Debug, Clone, PartialEq)]
pub enum NnwPrior {
    /// Hyperparameters held fixed for the whole run.
    Fixed {
        mean: Array1<f64>,
        var_scaling: f64,
        scale: Array2<f64>,
        deg_free: f64,
    },
    /// Gaussian hyperprior on the centering mean; the remaining
    /// hyperparameters stay fixed.
    NormalMean {
        mean_mean: Array1<f64>,
        mean_var: Array2<f64>,
        var_scaling: f64,
        scale: Array2<f64>,
        deg_free: f64,
    },
    /// Normal–Gamma–inverse-Wishart hyperprior on the centering mean,
    /// the variance scaling and the scale matrix.
    Ngiw {
        mean_mean: Array1<f64>,
        mean_var: Array2<f64>,
        var_scaling_shape: f64,
        var_scaling_rate: f64,
        scale_deg_free: f64,
        scale_scale: Array2<f64>,
        deg_free: f64,
    },
}

/// Posterior values of the conjugate normal/Wishart update.
struct PosteriorParams {
    mean: Array1<f64>,
    var_scaling: f64,
    scale: Array2<f64>,
    deg_free: f64,
}

/// `d`-variate conjugate hierarchy: normal likelihood in precision
/// form, normal prior on the mean, Wishart prior on the precision.
#[derive(Debug, Clone)]
pub struct NnwHierarchy {
    prior: NnwPrior,
    hypers: Rc<RefCell<NnwHypers>>,
    dim: usize,
    state_mean: Array1<f64>,
    prec: Array2<f64>,
    prec_chol: Array2<f64>,
    prec_logdet: f64,
    data_sum: Array1<f64>,
    data_sum_squares: Array2<f64>,
    card: usize,
    data_idx: BTreeSet<usize>,
}

impl NnwHierarchy {
    pub fn new(prior: NnwPrior) -> Result<Self> {
        let hypers = match &prior {
            NnwPrior::Fixed {
                mean,
                var_scaling,
                scale,
                deg_free,
            } => NnwHypers::new(mean.clone(), *var_scaling, scale.clone(), *deg_free)?,
            NnwPrior::NormalMean {
                mean_mean,
                mean_var,
                var_scaling,
                scale,
                deg_free,
            } => {
                if mean_var.nrows() != mean_mean.len() {
                    return Err(Error::DimensionMismatch {
                        name: "centering-mean hyperprior variance",
                        expected: mean_mean.len(),
                        actual: mean_var.nrows(),
                    });
                }
                inverse_spd(mean_var.view(), "centering-mean hyperprior variance")?;
                NnwHypers::new(mean_mean.clone(), *var_scaling, scale.clone(), *deg_free)?
            }
            NnwPrior::Ngiw {
                mean_mean,
                mean_var,
                var_scaling_shape,
                var_scaling_rate,
                scale_deg_free,
                scale_scale,
                deg_free,
            } => {
                let dim = mean_mean.len();
                if mean_var.nrows() != dim || scale_scale.nrows() != dim {
                    return Err(Error::DimensionMismatch {
                        name: "hyperprior matrices",
                        expected: dim,
                        actual: mean_var.nrows().max(scale_scale.nrows()),
                    });
                }
                inverse_spd(mean_var.view(), "centering-mean hyperprior variance")?;
                if *var_scaling_shape <= 0.0 || *var_scaling_rate <= 0.0 {
                    return Err(Error::InvalidParameter(
                        "variance-scaling hyperprior shape and rate must be > 0".to_string(),
                    ));
                }
                if *scale_deg_free <= 0.0 {
                    return Err(Error::DegreesOfFreedom {
                        name: "scale hyperprior",
                        min: 0.0,
                        value: *scale_deg_free,
                    });
                }
                inverse_spd(scale_scale.view(), "scale hyperprior scale")?;
                NnwHypers::new(
                    mean_mean.clone(),
                    var_scaling_shape / var_scaling_rate,
                    scale_scale / (scale_deg_free + dim as f64 + 1.0),
                    *deg_free,
                )?
            }
        };
        let dim = hypers.mean.len();
        let mut hier = NnwHierarchy {
            prior,
            hypers: Rc::new(RefCell::new(hypers)),
            dim,
            state_mean: Array1::zeros(dim),
            prec: Array2::zeros((dim, dim)),
            prec_chol: Array2::zeros((dim, dim)),
            prec_logdet: 0.0,
            data_sum: Array1::zeros(dim),
            data_sum_squares: Array2::zeros((dim, dim)),
            card: 0,
            data_idx: BTreeSet::new(),
        };
        hier.initialize()?;
        Ok(hier)
    }

    /// Replaces the cluster precision and refreshes the cached upper
    /// Cholesky factor and log-determinant.
    fn set_prec(&mut self, prec: Array2<f64>) -> Result<()> {
        let chol = spd_cholesky_upper(prec.view(), "cluster precision")?;
        self.prec_logdet = 2.0 * chol.diag().mapv(f64::ln).sum();
        self.prec_chol = chol;
        self.prec = prec;
        Ok(())
    }

    /// Conjugate normal/Wishart update from the accumulated sufficient
    /// statistics.
    fn posterior_hypers(&self) -> Result<PosteriorParams> {
        let hypers = self.hypers.borrow();
        if self.card == 0 {
            return Ok(PosteriorParams {
                mean: hypers.mean.clone(),
                var_scaling: hypers.var_scaling,
                scale: hypers.scale.clone(),
                deg_free: hypers.deg_free,
            });
        }
        let n = self.card as f64;
        let ybar = &self.data_sum / n;
        let var_scaling = hypers.var_scaling + n;
        let deg_free = hypers.deg_free + 0.5 * n;
        let mean = (&hypers.mean * hypers.var_scaling + &self.data_sum) / var_scaling;

        let ybar_col = ybar.view().insert_axis(Axis(1));
        let scatter = &self.data_sum_squares - &(ybar_col.dot(&ybar_col.t()) * n);
        let diff = &ybar - &hypers.mean;
        let diff_col = diff.view().insert_axis(Axis(1));
        let shrink = n * hypers.var_scaling / var_scaling;
        let tau_temp =
            (scatter + diff_col.dot(&diff_col.t()) * shrink) * 0.5 + hypers.scale_inv();
        let scale = inverse_spd(tau_temp.view(), "posterior scale")?;
        Ok(PosteriorParams {
            mean,
            var_scaling,
            scale,
            deg_free,
        })
    }

    fn sample_state<R: Rng>(&mut self, params: &PosteriorParams, rng: &mut R) -> Result<()> {
        let prec_new = wishart_rng(params.deg_free, params.scale.view(), rng)?;
        let mean_prec = &prec_new * params.var_scaling;
        self.state_mean = multi_normal_prec_rng(params.mean.view(), mean_prec.view(), rng)?;
        self.set_prec(prec_new)
    }
}

impl Hierarchy for NnwHierarchy {
    fn id(&self) -> &'static str {
        "NNW"
    }

    fn initialize(&mut self) -> Result<()> {
        let (mean, var_scaling) = {
            let hypers = self.hypers.borrow();
            (hypers.mean.clone(), hypers.var_scaling)
        };
        self.state_mean = mean;
        self.set_prec(Array2::eye(self.dim) * var_scaling)?;
        self.data_sum = Array1::zeros(self.dim);
        self.data_sum_squares = Array2::zeros((self.dim, self.dim));
        self.card = 0;
        self.data_idx = BTreeSet::new();
        Ok(())
    }

    fn draw<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        let params = {
            let hypers = self.hypers.borrow();
            PosteriorParams {
                mean: hypers.mean.clone(),
                var_scaling: hypers.var_scaling,
                scale: hypers.scale.clone(),
                deg_free: hypers.deg_free,
            }
        };
        self.sample_state(&params, rng)
    }

    fn sample_given_data<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        let params = self.posterior_hypers()?;
        self.sample_state(&params, rng)
    }

    fn add_datum(&mut self, idx: usize, datum: ArrayView1<f64>) {
        let inserted = self.data_idx.insert(idx);
        debug_assert!(inserted, "datum already assigned to this cluster");
        self.card += 1;
        self.data_sum += &datum;
        let col = datum.insert_axis(Axis(1));
        self.data_sum_squares += &col.dot(&col.t());
    }

    fn remove_datum(&mut self, idx: usize, datum: ArrayView1<f64>) {
        let removed = self.data_idx.remove(&idx);
        debug_assert!(removed, "datum was not assigned to this cluster");
        self.card -= 1;
        self.data_sum -= &datum;
        let col = datum.insert_axis(Axis(1));
        self.data_sum_squares -= &col.dot(&col.t());
    }

    fn card(&self) -> usize {
        self.card
    }

    fn data_indices(&self) -> &BTreeSet<usize> {
        &self.data_idx
    }

    fn like_lpdf(&self, datum: ArrayView1<f64>) -> f64 {
        multi_normal_prec_lpdf(
            datum,
            self.state_mean.view(),
            &self.prec_chol,
            self.prec_logdet,
        )
    }

    fn marg_lpdf(&self, datum: ArrayView1<f64>) -> f64 {
        let hypers = self.hypers.borrow();
        let dim = self.dim as f64;
        let deg_free = 2.0 * hypers.deg_free - dim + 1.0;
        let factor =
            (hypers.deg_free - 0.5 * (dim - 1.0)) * hypers.var_scaling / (hypers.var_scaling + 1.0);
        let inv_scale_chol = &hypers.scale_inv_chol * factor.sqrt();
        let inv_scale_logdet = hypers.scale_inv_logdet + dim * factor.ln();
        multi_student_t_invscale_chol_lpdf(
            datum,
            deg_free,
            hypers.mean.view(),
            &inv_scale_chol,
            inv_scale_logdet,
        )
    }

    fn update_hypers<R: Rng>(&mut self, states: &[ClusterState], rng: &mut R) -> Result<()> {
        match &self.prior {
            NnwPrior::Fixed { .. } => Ok(()),
            NnwPrior::NormalMean {
                mean_mean,
                mean_var,
                ..
            } => {
                let var_scaling = self.hypers.borrow().var_scaling;
                let sigma_inv = inverse_spd(mean_var.view(), "centering-mean hyperprior variance")?;
                let mut prec_acc = Array2::<f64>::zeros((self.dim, self.dim));
                let mut num_acc = Array1::<f64>::zeros(self.dim);
                for state in states {
                    match &state.params {
                        ClusterParams::MultiLs { mean, prec } => {
                            let prec_i = prec.to_array()?;
                            num_acc += &prec_i.dot(&mean.to_array());
                            prec_acc += &prec_i;
                        }
                        _ => return Err(Error::StateMismatch { expected: "NNW" }),
                    }
                }
                let post_prec = prec_acc * var_scaling + &sigma_inv;
                let num = num_acc * var_scaling + sigma_inv.dot(mean_mean);
                let post_mean =
                    inverse_spd(post_prec.view(), "centering-mean posterior precision")?.dot(&num);
                let draw = multi_normal_prec_rng(post_mean.view(), post_prec.view(), rng)?;
                self.hypers.borrow_mut().mean = draw;
                Ok(())
            }
            NnwPrior::Ngiw {
                mean_mean,
                mean_var,
                var_scaling_shape,
                var_scaling_rate,
                scale_deg_free,
                scale_scale,
                ..
            } => {
                let (curr_mean, var_scaling, deg_free) = {
                    let hypers = self.hypers.borrow();
                    (hypers.mean.clone(), hypers.var_scaling, hypers.deg_free)
                };
                let sigma_inv = inverse_spd(mean_var.view(), "centering-mean hyperprior variance")?;
                let mut tau_acc = Array2::<f64>::zeros((self.dim, self.dim));
                let mut num_acc = Array1::<f64>::zeros(self.dim);
                let mut rate_acc = 0.0;
                for state in states {
                    match &state.params {
                        ClusterParams::MultiLs { mean, prec } => {
                            let prec_i = prec.to_array()?;
                            let mean_i = mean.to_array();
                            num_acc += &prec_i.dot(&mean_i);
                            let diff = &curr_mean - &mean_i;
                            rate_acc += diff.dot(&prec_i.dot(&diff));
                            tau_acc += &prec_i;
                        }
                        _ => return Err(Error::StateMismatch { expected: "NNW" }),
                    }
                }
                let post_prec = &tau_acc * var_scaling + &sigma_inv;
                let tau_n = tau_acc + scale_scale;
                let num = num_acc * var_scaling + sigma_inv.dot(mean_mean);
                let rate_n = var_scaling_rate + 0.5 * rate_acc;
                let sig_n = inverse_spd(post_prec.view(), "centering-mean posterior precision")?;
                let mu_n = sig_n.dot(&num);
                let shape_n = var_scaling_shape + 0.5 * states.len() as f64;
                let nu_n = scale_deg_free + states.len() as f64 * deg_free;

                let new_mean = multi_normal_rng(mu_n.view(), sig_n.view(), rng)?;
                let new_var_scaling = gamma_rng(shape_n, rate_n, rng)?;
                let new_scale = inv_wishart_rng(nu_n, tau_n.view(), rng)?;
                let mut hypers = self.hypers.borrow_mut();
                hypers.mean = new_mean;
                hypers.var_scaling = new_var_scaling;
                hypers.set_scale(new_scale)
            }
        }
    }

    fn cluster_state(&self) -> ClusterState {
        ClusterState {
            cardinality: self.card,
            params: ClusterParams::MultiLs {
                mean: VectorData::from_array(self.state_mean.view()),
                prec: MatrixData::from_array(self.prec.view()),
            },
        }
    }

    fn set_cluster_state(&mut self, state: &ClusterState) -> Result<()> {
        match &state.params {
            ClusterParams::MultiLs { mean, prec } => {
                if mean.size != self.dim {
                    return Err(Error::DimensionMismatch {
                        name: "cluster state mean",
                        expected: self.dim,
                        actual: mean.size,
                    });
                }
                self.state_mean = mean.to_array();
                self.set_prec(prec.to_array()?)?;
                self.card = state.cardinality;
                Ok(())
            }
            _ => Err(Error::StateMismatch { expected: "NNW" }),
        }
    }

    fn fresh(&self) -> Self {
        let mut out = self.clone();
        out.data_sum = Array1::zeros(self.dim);
        out.data_sum_squares = Array2::zeros((self.dim, self.dim));
        out.card = 0;
        out.data_idx = BTreeSet::new();
        out
    }
}
