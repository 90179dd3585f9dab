//! `bnpmix-mcmc` implements marginal Gibbs sampling for Bayesian
//! nonparametric mixture models over the contracts of the `bnpmix`
//! crate.
//!
//! A sampler is assembled from three plug-ins:
//!
//! - a conjugate **hierarchy** — [`NnigHierarchy`] for univariate data,
//!   [`NnwHierarchy`] for `d`-variate data;
//! - a partition-prior **mixing** — [`DirichletProcess`] (optionally
//!   with a Gamma hyperprior on the total mass) or [`PitmanYor`];
//! - an **algorithm** — the collapsed sampler [`Neal2`] or the
//!   auxiliary-variable sampler [`Neal8`] (Neal, 2000, Algorithms 2
//!   and 8).
//!
//! Each run streams one snapshot per kept iteration into a
//! [`MemoryCollector`] or [`FileCollector`]; the collected chain can be
//! replayed to evaluate posterior-predictive densities on a grid via
//! `eval_lpdf`.

pub mod algorithms;
pub mod collectors;
pub mod hierarchies;
pub mod mixings;

pub use algorithms::{Neal2, Neal2Params, Neal8, Neal8Params};
pub use collectors::{FileCollector, MemoryCollector};
pub use hierarchies::{NnigHierarchy, NnigHypers, NnigPrior, NnwHierarchy, NnwHypers, NnwPrior};
pub use mixings::{DirichletProcess, DpPrior, PitmanYor};
