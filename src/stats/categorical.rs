//! Softmax normalization and categorical sampling from log-weights.

use ndarray::{Array1, ArrayView1};
use rand::Rng;

/// Numerically stable log-sum-exp.
pub fn log_sum_exp(values: ArrayView1<f64>) -> f64 {
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Softmax with max-subtraction.
pub fn softmax(log_weights: ArrayView1<f64>) -> Array1<f64> {
    let max = log_weights.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let mut out = log_weights.mapv(|w| (w - max).exp());
    let total = out.sum();
    out /= total;
    out
}

/// Categorical draw from unnormalized log-weights.
///
/// The inverse-CDF scan resolves numerically indistinguishable weights
/// deterministically toward the lower index.
pub fn categorical_log_weights_rng<R: Rng>(log_weights: ArrayView1<f64>, rng: &mut R) -> usize {
    let probs = softmax(log_weights);
    let u: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (idx, p) in probs.iter().enumerate() {
        cumulative += p;
        if u <= cumulative {
            return idx;
        }
    }
    probs.len() - 1
}
