//! Interfaces to the external analysis back ends.
//!
//! The engine never analyzes a non-trivial block itself. It hands blocks that
//! are below threshold to a [`TransientOracle`] and turns sampled CDFs into
//! compact analytical surrogates through an [`Approximator`].

use sanet_core::{ActivityGraph, ActivityId, Cdf, Time, TimeGrid, WeightedFeature};

use crate::error::{OracleError, OracleResult};

/// Computes the completion-time CDF of a block on a grid.
pub trait TransientOracle {
    /// CDF of `block` at every point of `grid`, within `error` where applicable.
    ///
    /// Must be deterministic for an identical block and grid.
    fn analyze_exact(
        &self,
        graph: &ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        error: f64,
    ) -> OracleResult<Cdf>;

    /// Empirical CDF from `runs` sampled executions.
    fn simulate(
        &self,
        graph: &ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        runs: usize,
    ) -> OracleResult<Cdf> {
        let _ = (grid, runs);
        Err(OracleError::Unsupported {
            operation: "simulate".to_string(),
            block: graph.name(block)?.to_string(),
        })
    }
}

/// Fits a timing-feature mixture to a sampled CDF.
pub trait Approximator {
    /// Mixture approximating `samples` (sampled with spacing `step`) on
    /// `[lower, upper]`. Weights must sum to one.
    fn fit(
        &self,
        samples: &Cdf,
        lower: &Time,
        upper: &Time,
        step: &Time,
    ) -> OracleResult<Vec<WeightedFeature>>;
}

impl<T: TransientOracle + ?Sized> TransientOracle for &T {
    fn analyze_exact(
        &self,
        graph: &ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        error: f64,
    ) -> OracleResult<Cdf> {
        (**self).analyze_exact(graph, block, grid, error)
    }

    fn simulate(
        &self,
        graph: &ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        runs: usize,
    ) -> OracleResult<Cdf> {
        (**self).simulate(graph, block, grid, runs)
    }
}

impl<T: Approximator + ?Sized> Approximator for &T {
    fn fit(
        &self,
        samples: &Cdf,
        lower: &Time,
        upper: &Time,
        step: &Time,
    ) -> OracleResult<Vec<WeightedFeature>> {
        (**self).fit(samples, lower, upper, step)
    }
}
