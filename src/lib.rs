//! `bnpmix` provides the building blocks for Bayesian nonparametric
//! mixture-model inference in Rust.
//!
//! A mixture model whose number of components is unknown is fitted by
//! Markov-chain Monte Carlo, assembled from three orthogonal plug-in
//! choices:
//!
//! - a **mixing** process — the prior over partitions (Dirichlet
//!   process, Pitman-Yor, ...),
//! - a **hierarchy** — the per-cluster observation/parameter family
//!   (conjugate normal models, ...),
//! - an **algorithm** — the MCMC sampler producing the posterior chain.
//!
//! This crate holds the contracts ([`traits::Hierarchy`],
//! [`traits::Mixing`], [`traits::Collector`]), the typed chain-state
//! messages ([`state`]), the shared distribution primitives ([`stats`])
//! and the seeded generator plumbing ([`rng`]). The concrete families
//! and samplers live in the `bnpmix-mcmc` member crate:
//!
//! | Name | Purpose | Category |
//! | :--- | :--- | :--- |
//! | [mcmc](../bnpmix_mcmc/) | Marginal Gibbs samplers (Neal 2 / Neal 8), conjugate hierarchies, partition priors, chain collectors and density evaluation | Unsupervised learning |

pub mod error;
pub mod rng;
pub mod state;
pub mod stats;
pub mod traits;

pub use error::{Error, Result};
pub use state::{ChainState, ClusterParams, ClusterState, MatrixData, MixingState, VectorData};
pub use traits::{Collector, Hierarchy, Mixing};

#[cfg(any(feature = "intel-mkl-system", feature = "intel-mkl-static"))]
extern crate intel_mkl_src;

#[cfg(any(feature = "openblas-system", feature = "openblas-static"))]
extern crate openblas_src;

#[cfg(any(feature = "netlib-system", feature = "netlib-static"))]
extern crate netlib_src;
