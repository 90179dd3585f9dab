use ndarray_rand::rand::Rng;

use bnpmix::error::{Error, Result};
use bnpmix::state::MixingState;
use bnpmix::traits::Mixing;

/// Pitman-Yor process mixing with strength `θ` and discount `σ`.
///
/// Existing clusters weigh `card − σ`, a new cluster weighs
/// `θ + K·σ`, with shared denominator `n + θ`. The Dirichlet process
/// is the `σ = 0` special case.
#[derive(Debug, Clone)]
pub struct PitmanYor {
    strength: f64,
    discount: f64,
}

impl PitmanYor {
    pub fn new(strength: f64, discount: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&discount) {
            return Err(Error::InvalidParameter(
                "discount must lie in [0, 1)".to_string(),
            ));
        }
        if strength <= -discount {
            return Err(Error::InvalidParameter(
                "strength must exceed minus the discount".to_string(),
            ));
        }
        Ok(PitmanYor { strength, discount })
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }
}

impl Mixing for PitmanYor {
    fn id(&self) -> &'static str {
        "PY"
    }

    fn mass_existing_cluster(&self, card: usize, n_rest: usize, log: bool, propto: bool) -> f64 {
        let mut out = card as f64 - self.discount;
        if !propto {
            out /= n_rest as f64 + self.strength;
        }
        if log {
            out.ln()
        } else {
            out
        }
    }

    fn mass_new_cluster(&self, n_clust: usize, n_rest: usize, log: bool, propto: bool) -> f64 {
        let mut out = self.strength + self.discount * n_clust as f64;
        if !propto {
            out /= n_rest as f64 + self.strength;
        }
        if log {
            out.ln()
        } else {
            out
        }
    }

    fn update_state<R: Rng>(&mut self, _cards: &[usize], _n: usize, _rng: &mut R) -> Result<()> {
        // strength and discount are fixed
        Ok(())
    }

    fn mixing_state(&self) -> MixingState {
        MixingState::PitmanYor {
            strength: self.strength,
            discount: self.discount,
        }
    }

    fn set_mixing_state(&mut self, state: &MixingState) -> Result<()> {
        match state {
            MixingState::PitmanYor { strength, discount } => {
                self.strength = *strength;
                self.discount = *discount;
                Ok(())
            }
            _ => Err(Error::StateMismatch { expected: "PY" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rejects_out_of_range_parameters() {
        assert!(PitmanYor::new(1.0, 1.0).is_err());
        assert!(PitmanYor::new(-0.5, 0.2).is_err());
        assert!(PitmanYor::new(1.0, 0.5).is_ok());
    }

    #[test]
    fn masses_normalize_to_one() {
        let mixing = PitmanYor::new(0.7, 0.3).unwrap();
        let cards = [4usize, 2];
        let n_rest = 6;
        let total: f64 = cards
            .iter()
            .map(|&c| mixing.mass_existing_cluster(c, n_rest, false, false))
            .sum::<f64>()
            + mixing.mass_new_cluster(cards.len(), n_rest, false, false);
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn discount_penalizes_small_clusters() {
        let mixing = PitmanYor::new(1.0, 0.4).unwrap();
        let small = mixing.mass_existing_cluster(1, 10, false, true);
        assert_abs_diff_eq!(small, 0.6, epsilon = 1e-12);
        let new = mixing.mass_new_cluster(3, 10, false, true);
        assert_abs_diff_eq!(new, 2.2, epsilon = 1e-12);
    }

    #[test]
    fn zero_discount_matches_dirichlet_weights() {
        let mixing = PitmanYor::new(2.0, 0.0).unwrap();
        assert_abs_diff_eq!(
            mixing.mass_existing_cluster(3, 9, false, false),
            3.0 / 11.0,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            mixing.mass_new_cluster(5, 9, false, false),
            2.0 / 11.0,
            epsilon = 1e-12
        );
    }
}
