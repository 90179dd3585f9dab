//! Multivariate normal, Wishart family and Student-t primitives.

use ndarray::{Array, Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::{cholesky::*, triangular::*};
use ndarray_rand::rand_distr::{Distribution, Gamma, StandardNormal};
use ndarray_rand::RandomExt;
use rand::Rng;
use statrs::function::gamma::ln_gamma;

use crate::error::{Error, Result};

const LN_2PI: f64 = 1.8378770664093453;

/// Relative tolerance for the symmetry check on SPD operands.
const SYMMETRY_TOL: f64 = 1e-10;

fn check_symmetric(m: ArrayView2<f64>, name: &'static str) -> Result<()> {
    if m.nrows() != m.ncols() {
        return Err(Error::DimensionMismatch {
            name,
            expected: m.nrows(),
            actual: m.ncols(),
        });
    }
    let scale = m.iter().fold(0.0f64, |acc, v| acc.max(v.abs())).max(1.0);
    for i in 0..m.nrows() {
        for j in (i + 1)..m.ncols() {
            if (m[[i, j]] - m[[j, i]]).abs() > SYMMETRY_TOL * scale {
                return Err(Error::NotPositiveDefinite { name });
            }
        }
    }
    Ok(())
}

/// Lower Cholesky factor of a symmetric positive-definite matrix.
///
/// Fails loudly on asymmetric or indefinite input, naming the operand.
pub fn spd_cholesky_lower(m: ArrayView2<f64>, name: &'static str) -> Result<Array2<f64>> {
    check_symmetric(m, name)?;
    m.to_owned()
        .cholesky(UPLO::Lower)
        .map_err(|_| Error::NotPositiveDefinite { name })
}

/// Upper Cholesky factor `U` with `m = UᵀU`.
pub fn spd_cholesky_upper(m: ArrayView2<f64>, name: &'static str) -> Result<Array2<f64>> {
    check_symmetric(m, name)?;
    m.to_owned()
        .cholesky(UPLO::Upper)
        .map_err(|_| Error::NotPositiveDefinite { name })
}

/// Inverse of a symmetric positive-definite matrix through its Cholesky
/// factor and a triangular solve against the identity.
pub fn inverse_spd(m: ArrayView2<f64>, name: &'static str) -> Result<Array2<f64>> {
    let chol = spd_cholesky_lower(m, name)?;
    let inv_chol = chol
        .solve_triangular(UPLO::Lower, Diag::NonUnit, &Array2::eye(m.nrows()))
        .map_err(|_| Error::CholeskyFailed { name })?;
    Ok(inv_chol.t().dot(&inv_chol))
}

/// Log-density of a multivariate normal in precision form.
///
/// `prec_chol` is the upper Cholesky factor `U` of the precision matrix
/// (`Λ = UᵀU`) and `prec_logdet` is `ln|Λ|`; callers precompute both
/// once per cluster.
pub fn multi_normal_prec_lpdf(
    x: ArrayView1<f64>,
    mean: ArrayView1<f64>,
    prec_chol: &Array2<f64>,
    prec_logdet: f64,
) -> f64 {
    let dim = x.len() as f64;
    let diff = &x - &mean;
    let scaled = prec_chol.dot(&diff);
    let mahalanobis = scaled.dot(&scaled);
    -0.5 * (dim * LN_2PI - prec_logdet + mahalanobis)
}

/// Draws `x = μ + Λ^{-1/2} z` with `z` standard normal, given the
/// precision matrix `Λ`.
pub fn multi_normal_prec_rng<R: Rng>(
    mean: ArrayView1<f64>,
    prec: ArrayView2<f64>,
    rng: &mut R,
) -> Result<Array1<f64>> {
    let chol = spd_cholesky_upper(prec, "precision")?;
    let z: Array1<f64> = Array::random_using(mean.len(), StandardNormal, rng);
    let z_col = z.insert_axis(Axis(1));
    let sol = chol
        .solve_triangular(UPLO::Upper, Diag::NonUnit, &z_col)
        .map_err(|_| Error::CholeskyFailed { name: "precision" })?;
    Ok(&mean + &sol.remove_axis(Axis(1)))
}

/// Draws from a multivariate normal in covariance form.
pub fn multi_normal_rng<R: Rng>(
    mean: ArrayView1<f64>,
    cov: ArrayView2<f64>,
    rng: &mut R,
) -> Result<Array1<f64>> {
    let chol = spd_cholesky_lower(cov, "covariance")?;
    let z: Array1<f64> = Array::random_using(mean.len(), StandardNormal, rng);
    Ok(&mean + &chol.dot(&z))
}

/// Wishart draw by Bartlett decomposition.
pub fn wishart_rng<R: Rng>(
    deg_free: f64,
    scale: ArrayView2<f64>,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let dim = scale.nrows();
    if deg_free <= dim as f64 - 1.0 {
        return Err(Error::DegreesOfFreedom {
            name: "wishart",
            min: dim as f64 - 1.0,
            value: deg_free,
        });
    }
    let chol = spd_cholesky_lower(scale, "wishart scale")?;
    let mut bartlett = Array2::<f64>::zeros((dim, dim));
    for i in 0..dim {
        // Chi-square with deg_free - i dof as a Gamma draw
        let chi_sq = Gamma::new((deg_free - i as f64) / 2.0, 2.0)
            .map_err(|_| Error::DegreesOfFreedom {
                name: "wishart",
                min: dim as f64 - 1.0,
                value: deg_free,
            })?
            .sample(rng);
        bartlett[[i, i]] = chi_sq.sqrt();
        for j in 0..i {
            bartlett[[i, j]] = StandardNormal.sample(rng);
        }
    }
    let factor = chol.dot(&bartlett);
    Ok(factor.dot(&factor.t()))
}

/// Inverse-Wishart draw: the inverse of a Wishart draw with inverted
/// scale.
pub fn inv_wishart_rng<R: Rng>(
    deg_free: f64,
    scale: ArrayView2<f64>,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let scale_inv = inverse_spd(scale, "inverse-wishart scale")?;
    let wishart = wishart_rng(deg_free, scale_inv.view(), rng)?;
    inverse_spd(wishart.view(), "inverse-wishart draw")
}

/// Log of the multivariate gamma function.
fn ln_mv_gamma(dim: usize, a: f64) -> f64 {
    let mut out = 0.25 * (dim * (dim - 1)) as f64 * std::f64::consts::PI.ln();
    for j in 0..dim {
        out += ln_gamma(a - 0.5 * j as f64);
    }
    out
}

/// Inverse-Wishart log-density.
///
/// Validates symmetry and positive definiteness of both operands and
/// that the degrees of freedom exceed `dim - 1`.
pub fn inv_wishart_lpdf(x: ArrayView2<f64>, deg_free: f64, scale: ArrayView2<f64>) -> Result<f64> {
    let dim = scale.nrows();
    if x.nrows() != dim {
        return Err(Error::DimensionMismatch {
            name: "inverse-wishart operand",
            expected: dim,
            actual: x.nrows(),
        });
    }
    if deg_free <= dim as f64 - 1.0 {
        return Err(Error::DegreesOfFreedom {
            name: "inverse-wishart",
            min: dim as f64 - 1.0,
            value: deg_free,
        });
    }
    let scale_chol = spd_cholesky_lower(scale, "inverse-wishart scale")?;
    let x_chol = spd_cholesky_lower(x, "inverse-wishart operand")?;
    let scale_logdet = 2.0 * scale_chol.diag().mapv(f64::ln).sum();
    let x_logdet = 2.0 * x_chol.diag().mapv(f64::ln).sum();
    let x_inv = inverse_spd(x, "inverse-wishart operand")?;
    // tr(Ψ X⁻¹) for symmetric Ψ, X⁻¹
    let trace = (&scale * &x_inv).sum();
    Ok(0.5 * deg_free * scale_logdet
        - 0.5 * deg_free * dim as f64 * std::f64::consts::LN_2
        - ln_mv_gamma(dim, 0.5 * deg_free)
        - 0.5 * (deg_free + dim as f64 + 1.0) * x_logdet
        - 0.5 * trace)
}

/// Multivariate Student-t log-density in inverse-scale (precision)
/// parameterization.
pub fn multi_student_t_invscale_lpdf(
    x: ArrayView1<f64>,
    deg_free: f64,
    mean: ArrayView1<f64>,
    inv_scale: ArrayView2<f64>,
) -> Result<f64> {
    let chol = spd_cholesky_upper(inv_scale, "student-t inverse scale")?;
    let logdet = 2.0 * chol.diag().mapv(f64::ln).sum();
    Ok(multi_student_t_invscale_chol_lpdf(
        x, deg_free, mean, &chol, logdet,
    ))
}

/// [`multi_student_t_invscale_lpdf`] with the inverse-scale factored
/// ahead of time: `inv_scale_chol` is the upper Cholesky factor and
/// `inv_scale_logdet` its log-determinant.
pub fn multi_student_t_invscale_chol_lpdf(
    x: ArrayView1<f64>,
    deg_free: f64,
    mean: ArrayView1<f64>,
    inv_scale_chol: &Array2<f64>,
    inv_scale_logdet: f64,
) -> f64 {
    let dim = x.len() as f64;
    let diff = &x - &mean;
    let scaled = inv_scale_chol.dot(&diff);
    let quad = scaled.dot(&scaled);
    ln_gamma(0.5 * (deg_free + dim)) - ln_gamma(0.5 * deg_free)
        - 0.5 * dim * (deg_free * std::f64::consts::PI).ln()
        + 0.5 * inv_scale_logdet
        - 0.5 * (deg_free + dim) * (1.0 + quad / deg_free).ln()
}

#[cfg(test)]
mod tests {
    extern crate openblas_src;

    use super::*;
    use crate::rng;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn standard_normal_lpdf_at_origin() {
        let prec = array![[1.0, 0.0], [0.0, 1.0]];
        let chol = spd_cholesky_upper(prec.view(), "prec").unwrap();
        let lpdf = multi_normal_prec_lpdf(
            array![0.0, 0.0].view(),
            array![0.0, 0.0].view(),
            &chol,
            0.0,
        );
        assert_abs_diff_eq!(lpdf, -LN_2PI, epsilon = 1e-12);
    }

    #[test]
    fn prec_lpdf_matches_direct_evaluation() {
        let prec = array![[2.0, 0.3], [0.3, 1.5]];
        let chol = spd_cholesky_upper(prec.view(), "prec").unwrap();
        let logdet = 2.0 * chol.diag().mapv(f64::ln).sum();
        let x = array![0.4, -1.2];
        let mean = array![0.1, 0.2];
        let diff = &x - &mean;
        let quad = diff.dot(&prec.dot(&diff));
        let expected = -0.5 * (2.0 * LN_2PI - logdet + quad);
        let lpdf = multi_normal_prec_lpdf(x.view(), mean.view(), &chol, logdet);
        assert_abs_diff_eq!(lpdf, expected, epsilon = 1e-12);
    }

    #[test]
    fn inverse_of_diagonal() {
        let m = array![[2.0, 0.0], [0.0, 4.0]];
        let inv = inverse_spd(m.view(), "m").unwrap();
        assert_abs_diff_eq!(inv[[0, 0]], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[[1, 1]], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[[0, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn asymmetric_input_is_rejected() {
        let m = array![[1.0, 0.5], [0.0, 1.0]];
        assert!(matches!(
            inverse_spd(m.view(), "m"),
            Err(Error::NotPositiveDefinite { name: "m" })
        ));
    }

    #[test]
    fn inv_wishart_rejects_small_dof() {
        let scale = array![[1.0, 0.0], [0.0, 1.0]];
        let res = inv_wishart_lpdf(scale.view(), 0.5, scale.view());
        assert!(matches!(res, Err(Error::DegreesOfFreedom { .. })));
    }

    #[test]
    fn wishart_mean_is_dof_times_scale() {
        let mut rng = rng::seeded(3);
        let scale = array![[0.5, 0.1], [0.1, 0.4]];
        let deg_free = 6.0;
        let mut acc = Array2::<f64>::zeros((2, 2));
        let n_draws = 4000;
        for _ in 0..n_draws {
            acc = acc + wishart_rng(deg_free, scale.view(), &mut rng).unwrap();
        }
        acc /= n_draws as f64;
        let expected = scale.mapv(|v| v * deg_free);
        for (a, e) in acc.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(a, e, epsilon = 0.15);
        }
    }

    #[test]
    fn student_t_reduces_to_cauchy_in_one_dim() {
        // dof 1, unit scale at the location: log(1/π)
        let lpdf = multi_student_t_invscale_lpdf(
            array![0.0].view(),
            1.0,
            array![0.0].view(),
            array![[1.0]].view(),
        )
        .unwrap();
        assert_abs_diff_eq!(lpdf, -std::f64::consts::PI.ln(), epsilon = 1e-12);
    }
}
