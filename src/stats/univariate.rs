//! Univariate density and sampling helpers.

use ndarray_rand::rand_distr::{Distribution, Gamma};
use rand::Rng;
use statrs::function::gamma::ln_gamma;

use crate::error::{Error, Result};

const LN_2PI: f64 = 1.8378770664093453;

/// Normal log-density parameterized by variance.
pub fn normal_lpdf(x: f64, mean: f64, var: f64) -> f64 {
    -0.5 * (LN_2PI + var.ln() + (x - mean).powi(2) / var)
}

/// Student-t log-density with location and scale.
pub fn student_t_lpdf(x: f64, deg_free: f64, location: f64, scale: f64) -> f64 {
    let z = (x - location) / scale;
    ln_gamma(0.5 * (deg_free + 1.0)) - ln_gamma(0.5 * deg_free)
        - 0.5 * (deg_free * std::f64::consts::PI).ln()
        - scale.ln()
        - 0.5 * (deg_free + 1.0) * (1.0 + z * z / deg_free).ln()
}

/// Gamma draw in shape/rate parameterization.
pub fn gamma_rng<R: Rng>(shape: f64, rate: f64, rng: &mut R) -> Result<f64> {
    let gamma = Gamma::new(shape, 1.0 / rate).map_err(|_| {
        Error::InvalidParameter(format!("gamma(shape = {}, rate = {})", shape, rate))
    })?;
    Ok(gamma.sample(rng))
}

/// Inverse-gamma draw in shape/scale parameterization: the reciprocal
/// of a Gamma draw with the scale as its rate.
pub fn inv_gamma_rng<R: Rng>(shape: f64, scale: f64, rng: &mut R) -> Result<f64> {
    Ok(1.0 / gamma_rng(shape, scale, rng)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng;
    use approx::assert_abs_diff_eq;

    #[test]
    fn standard_normal_at_zero() {
        assert_abs_diff_eq!(normal_lpdf(0.0, 0.0, 1.0), -0.5 * LN_2PI, epsilon = 1e-12);
    }

    #[test]
    fn student_t_with_one_dof_is_cauchy() {
        assert_abs_diff_eq!(
            student_t_lpdf(0.0, 1.0, 0.0, 1.0),
            -std::f64::consts::PI.ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn inv_gamma_mean() {
        // E[InvGamma(a, b)] = b / (a - 1)
        let mut rng = rng::seeded(11);
        let n_draws = 20000;
        let mean = (0..n_draws)
            .map(|_| inv_gamma_rng(4.0, 6.0, &mut rng).unwrap())
            .sum::<f64>()
            / n_draws as f64;
        assert_abs_diff_eq!(mean, 2.0, epsilon = 0.05);
    }

    #[test]
    fn gamma_rejects_nonpositive_shape() {
        let mut rng = rng::seeded(1);
        assert!(gamma_rng(0.0, 1.0, &mut rng).is_err());
    }
}
