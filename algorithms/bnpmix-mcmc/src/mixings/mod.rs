//! Partition priors.

mod dirichlet;
mod pitman_yor;

pub use dirichlet::{DirichletProcess, DpPrior};
pub use pitman_yor::PitmanYor;
