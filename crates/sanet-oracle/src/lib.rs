//! Reference back ends for `sanet-engine`.
//!
//! - [`MonteCarloOracle`] samples block executions with a seeded generator
//!   and serves both exact-analysis and simulation requests from the
//!   empirical CDF.
//! - [`PiecewiseUniformApproximator`] turns a sampled CDF into a mixture of
//!   uniform timers, with an optional exponential tail.
//!
//! Neither is a state-space solver; they make the engine runnable end to end.

mod monte_carlo;
mod piecewise;

pub use monte_carlo::MonteCarloOracle;
pub use piecewise::PiecewiseUniformApproximator;

use sanet_engine::{EngineResult, HeuristicConfig, HeuristicEngine};

/// Engine wired to the reference oracle and approximator.
pub type ReferenceEngine = HeuristicEngine<MonteCarloOracle, PiecewiseUniformApproximator>;

/// Build a [`ReferenceEngine`] with default back ends.
pub fn reference_engine(config: HeuristicConfig) -> EngineResult<ReferenceEngine> {
    HeuristicEngine::new(
        config,
        MonteCarloOracle::default(),
        PiecewiseUniformApproximator::default(),
    )
}
