//! Shared plumbing of the marginal samplers: the outer iteration loop
//! and the streaming posterior-predictive density evaluation.

use ndarray::{Array1, Array2, ArrayView2};
use tracing::{debug, info};

use bnpmix::error::Result;
use bnpmix::stats::log_sum_exp;
use bnpmix::traits::{Collector, Hierarchy, Mixing};

use super::engine::Engine;

/// Runs `burnin + iterations` Gibbs iterations, emitting a snapshot for
/// each of the last `iterations`. On error the collector is still
/// closed, so the chain collected so far survives the unwind.
pub(crate) fn run_chain<H, M, C, F>(
    engine: &mut Engine<H, M>,
    burnin: usize,
    iterations: usize,
    collector: &mut C,
    mut sample_allocations: F,
) -> Result<()>
where
    H: Hierarchy,
    M: Mixing,
    C: Collector,
    F: FnMut(&mut Engine<H, M>) -> Result<()>,
{
    info!(
        hierarchy = engine.prototype.id(),
        mixing = engine.mixing.id(),
        burnin,
        iterations,
        n_data = engine.n_data(),
        "starting marginal Gibbs run"
    );
    collector.start()?;
    let outcome: Result<()> = (|| {
        for t in 0..burnin + iterations {
            sample_allocations(engine)?;
            engine.sample_unique_values()?;
            engine.update_mixing()?;
            engine.update_hypers()?;
            if t >= burnin {
                collector.append(&engine.snapshot(t - burnin))?;
            }
            debug!(
                iteration = t,
                n_clusters = engine.n_clusters(),
                "iteration complete"
            );
        }
        Ok(())
    })();
    match outcome {
        Ok(()) => collector.finish(),
        Err(e) => {
            let _ = collector.finish();
            Err(e)
        }
    }
}

/// Streams a collected chain and evaluates the posterior-predictive
/// log-density of every grid row under every snapshot.
///
/// Each snapshot contributes one `T×G` row: the log-sum-exp over its
/// clusters, weighted by the mixing's normalized masses, plus the
/// marginal new-cluster component supplied by the caller (prior
/// predictive for collapsed samplers, a prior-draw average for
/// auxiliary-variable ones). Snapshots are visited one at a time; the
/// chain is never materialized in memory.
pub(crate) fn eval_chain_lpdf<H, M, C, F>(
    prototype: &H,
    mixing: &M,
    n_data: usize,
    grid: ArrayView2<f64>,
    collector: &mut C,
    mut marginal_component: F,
) -> Result<Array2<f64>>
where
    H: Hierarchy,
    M: Mixing,
    C: Collector,
    F: FnMut(ArrayView2<f64>) -> Result<Array1<f64>>,
{
    collector.begin_reading()?;
    let n_grid = grid.nrows();
    let mut rows: Vec<Array1<f64>> = Vec::new();
    while let Some(state) = collector.next_state()? {
        let mut mix = mixing.clone();
        mix.set_mixing_state(&state.mixing_state)?;
        let n_clust = state.cluster_states.len();
        let mut components = Array2::<f64>::zeros((n_clust + 1, n_grid));
        for (k, cluster_state) in state.cluster_states.iter().enumerate() {
            let mut cluster = prototype.fresh();
            cluster.set_cluster_state(cluster_state)?;
            let mass = mix.mass_existing_cluster(cluster_state.cardinality, n_data, true, false);
            components
                .row_mut(k)
                .assign(&(cluster.like_lpdf_grid(grid) + mass));
        }
        let new_mass = mix.mass_new_cluster(n_clust, n_data, true, false);
        components
            .row_mut(n_clust)
            .assign(&(marginal_component(grid)? + new_mass));
        rows.push(Array1::from(
            (0..n_grid)
                .map(|g| log_sum_exp(components.column(g)))
                .collect::<Vec<_>>(),
        ));
    }
    let mut out = Array2::zeros((rows.len(), n_grid));
    for (t, row) in rows.iter().enumerate() {
        out.row_mut(t).assign(row);
    }
    Ok(out)
}
