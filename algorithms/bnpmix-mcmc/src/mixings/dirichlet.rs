use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::{Beta, Distribution};

use bnpmix::error::{Error, Result};
use bnpmix::state::MixingState;
use bnpmix::stats::gamma_rng;
use bnpmix::traits::Mixing;

/// Prior configuration for the Dirichlet process total mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DpPrior {
    /// Total mass held fixed for the whole run.
    Fixed { total_mass: f64 },
    /// Gamma hyperprior on the total mass, resampled each iteration
    /// with the Escobar–West auxiliary-variable step.
    Gamma { shape: f64, rate: f64 },
}

/// Dirichlet process mixing: weight `M` for a new cluster, weights
/// proportional to cardinality for existing ones, shared denominator
/// `n + M`.
#[derive(Debug, Clone)]
pub struct DirichletProcess {
    prior: DpPrior,
    total_mass: f64,
    log_total_mass: f64,
}

impl DirichletProcess {
    pub fn new(prior: DpPrior) -> Result<Self> {
        let total_mass = match prior {
            DpPrior::Fixed { total_mass } => {
                if total_mass <= 0.0 {
                    return Err(Error::InvalidParameter(
                        "total mass must be > 0".to_string(),
                    ));
                }
                total_mass
            }
            DpPrior::Gamma { shape, rate } => {
                if shape <= 0.0 || rate <= 0.0 {
                    return Err(Error::InvalidParameter(
                        "total-mass hyperprior shape and rate must be > 0".to_string(),
                    ));
                }
                shape / rate
            }
        };
        Ok(DirichletProcess {
            prior,
            total_mass,
            log_total_mass: total_mass.ln(),
        })
    }

    pub fn total_mass(&self) -> f64 {
        self.total_mass
    }

    fn set_total_mass(&mut self, total_mass: f64) {
        self.total_mass = total_mass;
        self.log_total_mass = total_mass.ln();
    }
}

impl Mixing for DirichletProcess {
    fn id(&self) -> &'static str {
        "DP"
    }

    fn mass_existing_cluster(&self, card: usize, n_rest: usize, log: bool, propto: bool) -> f64 {
        if log {
            let mut out = (card as f64).ln();
            if !propto {
                out -= (n_rest as f64 + self.total_mass).ln();
            }
            out
        } else {
            let mut out = card as f64;
            if !propto {
                out /= n_rest as f64 + self.total_mass;
            }
            out
        }
    }

    fn mass_new_cluster(&self, _n_clust: usize, n_rest: usize, log: bool, propto: bool) -> f64 {
        if log {
            let mut out = self.log_total_mass;
            if !propto {
                out -= (n_rest as f64 + self.total_mass).ln();
            }
            out
        } else {
            let mut out = self.total_mass;
            if !propto {
                out /= n_rest as f64 + self.total_mass;
            }
            out
        }
    }

    fn update_state<R: Rng>(&mut self, cards: &[usize], n: usize, rng: &mut R) -> Result<()> {
        match self.prior {
            DpPrior::Fixed { .. } => Ok(()),
            DpPrior::Gamma { shape, rate } => {
                // Escobar & West auxiliary-variable update
                let n_clust = cards.len() as f64;
                let eta = Beta::new(self.total_mass + 1.0, n as f64)
                    .map_err(|_| {
                        Error::InvalidParameter(format!(
                            "beta(a = {}, b = {})",
                            self.total_mass + 1.0,
                            n
                        ))
                    })?
                    .sample(rng);
                let rate_post = rate - eta.ln();
                let odds = (shape + n_clust - 1.0) / (n as f64 * rate_post);
                let pick_larger_shape: f64 = rng.gen();
                let shape_post = if pick_larger_shape < odds / (1.0 + odds) {
                    shape + n_clust
                } else {
                    shape + n_clust - 1.0
                };
                let draw = gamma_rng(shape_post, rate_post, rng)?;
                self.set_total_mass(draw);
                Ok(())
            }
        }
    }

    fn mixing_state(&self) -> MixingState {
        MixingState::Dirichlet {
            total_mass: self.total_mass,
        }
    }

    fn set_mixing_state(&mut self, state: &MixingState) -> Result<()> {
        match state {
            MixingState::Dirichlet { total_mass } => {
                self.set_total_mass(*total_mass);
                Ok(())
            }
            _ => Err(Error::StateMismatch { expected: "DP" }),
        }
    }
}
