//! Conjugate per-cluster families.

mod nnig;
mod nnw;

pub use nnig::{NnigHierarchy, NnigHypers, NnigPrior};
pub use nnw::{NnwHierarchy, NnwHypers, NnwPrior};
