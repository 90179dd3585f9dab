//! Typed chain-state messages.
//!
//! One [`ChainState`] is the snapshot of a single MCMC iteration: the
//! per-cluster parameter states, the allocation vector and the mixing
//! state. Collectors persist these messages; the wire encoding is the
//! collector's concern, the core only reads and writes the types below.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Row-major dense vector payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorData {
    pub size: usize,
    pub data: Vec<f64>,
}

impl VectorData {
    pub fn from_array(v: ArrayView1<f64>) -> Self {
        VectorData {
            size: v.len(),
            data: v.to_vec(),
        }
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.data.clone())
    }
}

/// Row-major dense matrix payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixData {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl MatrixData {
    pub fn from_array(m: ArrayView2<f64>) -> Self {
        MatrixData {
            rows: m.nrows(),
            cols: m.ncols(),
            data: m.iter().cloned().collect(),
        }
    }

    pub fn to_array(&self) -> Result<Array2<f64>> {
        Array2::from_shape_vec((self.rows, self.cols), self.data.clone())
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Per-cluster sampled parameters, one variant per hierarchy family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClusterParams {
    /// Univariate location-scale state (NNIG).
    UniLs { mean: f64, var: f64 },
    /// Multivariate location-precision state (NNW).
    MultiLs {
        mean: VectorData,
        prec: MatrixData,
    },
}

/// Snapshot of one cluster: sampled parameters plus cardinality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    pub cardinality: usize,
    pub params: ClusterParams,
}

/// Snapshot of the partition prior's own state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MixingState {
    Dirichlet { total_mass: f64 },
    PitmanYor { strength: f64, discount: f64 },
}

/// Snapshot of a full iteration, emitted once per kept iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub iteration: usize,
    pub cluster_states: Vec<ClusterState>,
    pub allocations: Vec<usize>,
    pub mixing_state: MixingState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn matrix_roundtrip() {
        let m = array![[1.0, 2.0], [3.0, 4.5]];
        let data = MatrixData::from_array(m.view());
        assert_eq!(data.data, vec![1.0, 2.0, 3.0, 4.5]);
        assert_eq!(data.to_array().unwrap(), m);
    }

    #[test]
    fn chain_state_serde_roundtrip() {
        let state = ChainState {
            iteration: 12,
            cluster_states: vec![
                ClusterState {
                    cardinality: 3,
                    params: ClusterParams::UniLs {
                        mean: 0.25,
                        var: 1.5,
                    },
                },
                ClusterState {
                    cardinality: 1,
                    params: ClusterParams::MultiLs {
                        mean: VectorData::from_array(array![0.0, -1.0].view()),
                        prec: MatrixData::from_array(array![[2.0, 0.1], [0.1, 2.0]].view()),
                    },
                },
            ],
            allocations: vec![0, 0, 0, 1],
            mixing_state: MixingState::Dirichlet { total_mass: 1.0 },
        };
        let bytes = serde_json::to_vec(&state).unwrap();
        let back: ChainState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, state);
    }
}
