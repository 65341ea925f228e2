//! Seeded Monte-Carlo transient oracle.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sanet_core::{time_to_f64, ActivityGraph, ActivityId, ActivityKind, Cdf, TimeGrid, WeightedFeature};
use sanet_engine::{OracleError, OracleResult, TransientOracle};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Samples closer than this to a grid point count as completed at that point.
const GRID_TOLERANCE: f64 = 1e-9;

/// Estimates completion-time CDFs from sampled executions.
///
/// Every call reseeds its generator from `seed`, so repeated calls on the
/// same block and grid return the same CDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloOracle {
    /// Samples drawn by `analyze_exact`.
    pub runs: usize,
    pub seed: u64,
    /// Cap on the iterations of a single repetition.
    pub max_iterations: usize,
}

impl Default for MonteCarloOracle {
    fn default() -> Self {
        Self {
            runs: 20_000,
            seed: 0x5a4e_7e57,
            max_iterations: 10_000,
        }
    }
}

impl MonteCarloOracle {
    pub fn new(runs: usize, seed: u64) -> Self {
        Self {
            runs,
            seed,
            ..Default::default()
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sorted completion times of `runs` executions of `block`.
    pub fn sample(&self, graph: &ActivityGraph, block: ActivityId, runs: usize) -> OracleResult<Vec<f64>> {
        if runs == 0 {
            return Err(OracleError::InvalidInput {
                message: "at least one run is required".to_string(),
            });
        }
        let plan = Plan::compile(graph, block)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut samples: Vec<f64> = (0..runs)
            .map(|_| plan.draw(&mut rng, self.max_iterations))
            .collect();
        samples.sort_by(f64::total_cmp);
        Ok(samples)
    }

    fn empirical_cdf(
        &self,
        graph: &ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        runs: usize,
    ) -> OracleResult<Cdf> {
        let samples = self.sample(graph, block, runs)?;
        let total = samples.len() as f64;
        Ok(Cdf::from_fn(grid, |t| {
            let t = time_to_f64(t) + GRID_TOLERANCE;
            samples.partition_point(|&s| s <= t) as f64 / total
        }))
    }
}

impl TransientOracle for MonteCarloOracle {
    fn analyze_exact(
        &self,
        graph: &ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        error: f64,
    ) -> OracleResult<Cdf> {
        // Dvoretzky-Kiefer-Wolfowitz half-width at 95% confidence.
        let half_width = ((2.0f64 / 0.05).ln() / (2.0 * self.runs.max(1) as f64)).sqrt();
        if half_width > error {
            debug!(
                block = %graph.name(block)?,
                runs = self.runs,
                half_width,
                error,
                "monte_carlo_band_wider_than_error"
            );
        }
        self.empirical_cdf(graph, block, grid, self.runs)
    }

    fn simulate(
        &self,
        graph: &ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        runs: usize,
    ) -> OracleResult<Cdf> {
        self.empirical_cdf(graph, block, grid, runs)
    }
}

/// Block structure flattened for repeated sampling.
#[derive(Debug, Clone)]
enum Plan {
    Leaf(Vec<WeightedFeature>),
    Sequence(Vec<Plan>),
    And(Vec<Plan>),
    Xor(Vec<(f64, Plan)>),
    Repeat { probability: f64, body: Box<Plan> },
    /// Nodes in topological order with predecessor indices; the end is last.
    Dag { nodes: Vec<Plan>, preds: Vec<Vec<usize>> },
}

impl Plan {
    fn compile(graph: &ActivityGraph, id: ActivityId) -> OracleResult<Plan> {
        let plan = match graph.get(id)?.kind() {
            ActivityKind::Simple { features } => Plan::Leaf(features.clone()),
            ActivityKind::Sequence { children } => Plan::Sequence(Self::compile_all(graph, children)?),
            ActivityKind::And { children } => Plan::And(Self::compile_all(graph, children)?),
            ActivityKind::Xor {
                alternatives,
                probs,
            } => Plan::Xor(
                probs
                    .iter()
                    .zip(alternatives)
                    .map(|(&p, &alt)| Ok((p, Self::compile(graph, alt)?)))
                    .collect::<OracleResult<_>>()?,
            ),
            ActivityKind::Repeat { body, probability } => Plan::Repeat {
                probability: *probability,
                body: Box::new(Self::compile(graph, *body)?),
            },
            ActivityKind::Dag { end, .. } => {
                let order = graph.topological_order(id)?;
                if order.last() != Some(end) {
                    return Err(OracleError::InvalidInput {
                        message: format!("{}: end is not the last activity", graph.name(id)?),
                    });
                }
                let index: HashMap<ActivityId, usize> =
                    order.iter().enumerate().map(|(i, &node)| (node, i)).collect();
                let preds = order
                    .iter()
                    .map(|&node| {
                        graph
                            .pre(node)
                            .iter()
                            .filter_map(|p| index.get(p).copied())
                            .collect()
                    })
                    .collect();
                Plan::Dag {
                    nodes: Self::compile_all(graph, &order)?,
                    preds,
                }
            }
        };
        Ok(plan)
    }

    fn compile_all(graph: &ActivityGraph, ids: &[ActivityId]) -> OracleResult<Vec<Plan>> {
        ids.iter().map(|&id| Self::compile(graph, id)).collect()
    }

    fn draw<R: Rng>(&self, rng: &mut R, max_iterations: usize) -> f64 {
        match self {
            Plan::Leaf(features) => {
                let feature = pick(rng, features.iter().map(|f| (f.weight, &f.feature)));
                feature.map_or(0.0, |f| f.quantile(rng.random::<f64>()))
            }
            Plan::Sequence(children) => children.iter().map(|c| c.draw(rng, max_iterations)).sum(),
            Plan::And(children) => children
                .iter()
                .map(|c| c.draw(rng, max_iterations))
                .fold(0.0, f64::max),
            Plan::Xor(branches) => {
                let branch = pick(rng, branches.iter().map(|(p, plan)| (*p, plan)));
                branch.map_or(0.0, |b| b.draw(rng, max_iterations))
            }
            Plan::Repeat { probability, body } => {
                let mut total = body.draw(rng, max_iterations);
                let mut iterations = 1;
                while iterations < max_iterations && rng.random::<f64>() < *probability {
                    total += body.draw(rng, max_iterations);
                    iterations += 1;
                }
                total
            }
            Plan::Dag { nodes, preds } => {
                let mut finish = vec![0.0; nodes.len()];
                for (i, node) in nodes.iter().enumerate() {
                    let start = preds[i].iter().map(|&p| finish[p]).fold(0.0, f64::max);
                    finish[i] = start + node.draw(rng, max_iterations);
                }
                finish.last().copied().unwrap_or(0.0)
            }
        }
    }
}

/// Weighted choice; weights need not be normalized.
fn pick<'a, T, R: Rng>(rng: &mut R, items: impl Iterator<Item = (f64, &'a T)> + Clone) -> Option<&'a T> {
    let total: f64 = items.clone().map(|(w, _)| w).sum();
    let mut target = rng.random::<f64>() * total;
    let mut last = None;
    for (weight, item) in items {
        if target < weight {
            return Some(item);
        }
        target -= weight;
        last = Some(item);
    }
    last
}
