//! Distribution primitives used by the hierarchies and samplers.
//!
//! Pure functions over `ndarray` types; anything that samples takes the
//! caller's generator. All likelihood arithmetic is in log-space, and
//! determinants always come from the same Cholesky factor used to solve
//! the associated linear system.

pub mod categorical;
pub mod multivariate;
pub mod univariate;

pub use categorical::{categorical_log_weights_rng, log_sum_exp, softmax};
pub use multivariate::{
    inv_wishart_lpdf, inv_wishart_rng, inverse_spd, multi_normal_prec_lpdf,
    multi_normal_prec_rng, multi_normal_rng, multi_student_t_invscale_chol_lpdf,
    multi_student_t_invscale_lpdf, spd_cholesky_lower, spd_cholesky_upper, wishart_rng,
};
pub use univariate::{gamma_rng, inv_gamma_rng, normal_lpdf, student_t_lpdf};
