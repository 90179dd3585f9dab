//! Marginal Gibbs samplers.

mod engine;
mod marginal;
mod neal2;
mod neal8;

pub use neal2::{Neal2, Neal2Params};
pub use neal8::{Neal8, Neal8Params};
