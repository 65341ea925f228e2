//! Piecewise-uniform approximation of sampled CDFs.

use num::ToPrimitive;
use sanet_core::{time_from_int, Cdf, Time, TimingFeature, WeightedFeature};
use sanet_engine::{Approximator, OracleError, OracleResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Increments below this are treated as no mass.
const MASS_EPSILON: f64 = 1e-12;

/// Fits a mixture of uniform timers over equal-width pieces of the support.
///
/// Mass already absorbed at the lower bound becomes a deterministic atom.
/// With `tail` set, mass still missing at the upper bound becomes a shifted
/// exponential whose rate matches the density at the cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PiecewiseUniformApproximator {
    pub pieces: usize,
    pub tail: bool,
}

impl Default for PiecewiseUniformApproximator {
    fn default() -> Self {
        Self {
            pieces: 10,
            tail: true,
        }
    }
}

impl PiecewiseUniformApproximator {
    pub fn new(pieces: usize, tail: bool) -> Self {
        Self { pieces, tail }
    }
}

fn grid_index(t: &Time, step: &Time, len: usize) -> OracleResult<usize> {
    let index = (t / step).floor().to_integer().to_usize().ok_or_else(|| OracleError::InvalidInput {
        message: format!("time {t} is not on a non-negative grid"),
    })?;
    Ok(index.min(len - 1))
}

fn grid_time(index: usize, step: &Time) -> Time {
    time_from_int(index as i64) * step
}

impl Approximator for PiecewiseUniformApproximator {
    fn fit(
        &self,
        samples: &Cdf,
        lower: &Time,
        upper: &Time,
        step: &Time,
    ) -> OracleResult<Vec<WeightedFeature>> {
        if samples.is_empty() {
            return Err(OracleError::InvalidInput {
                message: "no samples to fit".to_string(),
            });
        }
        if self.pieces == 0 {
            return Err(OracleError::InvalidInput {
                message: "at least one piece is required".to_string(),
            });
        }
        if lower > upper {
            return Err(OracleError::InvalidInput {
                message: format!("empty support [{lower}, {upper}]"),
            });
        }
        let values = samples.values();
        let first = grid_index(lower, step, values.len())?;
        let last = grid_index(upper, step, values.len())?;

        let mut features = Vec::new();
        if values[first] > MASS_EPSILON {
            features.push(WeightedFeature::new(
                values[first],
                TimingFeature::deterministic(grid_time(first, step))?,
            ));
        }

        let span = last - first;
        let mut start = first;
        for piece in 1..=self.pieces.min(span) {
            let end = first + (span * piece) / self.pieces.min(span);
            let mass = values[end] - values[start];
            if mass > MASS_EPSILON {
                features.push(WeightedFeature::new(
                    mass,
                    TimingFeature::uniform(grid_time(start, step), grid_time(end, step))?,
                ));
            }
            start = end;
        }

        let residual = 1.0 - values[last];
        if self.tail && residual > MASS_EPSILON {
            let step_f = sanet_core::time_to_f64(step);
            let density = if last > 0 {
                (values[last] - values[last - 1]) / step_f
            } else {
                0.0
            };
            let rate = if density > MASS_EPSILON {
                density / residual
            } else {
                1.0 / sanet_core::time_to_f64(upper).max(step_f)
            };
            debug!(residual, rate, "tail_fitted");
            features.push(WeightedFeature::new(
                residual,
                TimingFeature::shifted_exponential(grid_time(last, step), rate)?,
            ));
        }

        let total: f64 = features.iter().map(|f| f.weight).sum();
        if total <= MASS_EPSILON {
            warn!(upper = %upper, "no_mass_before_upper_bound");
            return Ok(vec![WeightedFeature::new(
                1.0,
                TimingFeature::deterministic(upper.clone())?,
            )]);
        }
        for feature in &mut features {
            feature.weight /= total;
        }
        Ok(features)
    }
}
