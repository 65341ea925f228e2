//! Uniform time grids and CDFs sampled on them.

use num::{Signed, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::time::{parse_time, time_from_int, time_to_f64, Time};

/// Evaluation points `0, step, 2*step, ..., floor(limit/step)*step`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeGrid {
    time_limit: Time,
    step: Time,
    len: usize,
}

impl TimeGrid {
    pub fn new(time_limit: Time, step: Time) -> ModelResult<Self> {
        if !step.is_positive() {
            return Err(ModelError::InvalidGrid {
                message: format!("step must be positive, got {step}"),
            });
        }
        if time_limit.is_negative() {
            return Err(ModelError::InvalidGrid {
                message: format!("time limit must be non-negative, got {time_limit}"),
            });
        }
        let len = (&time_limit / &step)
            .floor()
            .to_integer()
            .to_usize()
            .and_then(|points| points.checked_add(1))
            .ok_or_else(|| ModelError::InvalidGrid {
                message: format!("too many points for limit {time_limit} and step {step}"),
            })?;
        Ok(Self {
            time_limit,
            step,
            len,
        })
    }

    /// Grid from decimal literals, e.g. `TimeGrid::parse("10", "0.01")`.
    pub fn parse(time_limit: &str, step: &str) -> ModelResult<Self> {
        Self::new(parse_time(time_limit)?, parse_time(step)?)
    }

    pub fn time_limit(&self) -> &Time {
        &self.time_limit
    }

    pub fn step(&self) -> &Time {
        &self.step
    }

    pub fn step_f64(&self) -> f64 {
        time_to_f64(&self.step)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exact time of the `index`-th point.
    pub fn time_at(&self, index: usize) -> Time {
        &self.step * time_from_int(index as i64)
    }

    pub fn times(&self) -> impl Iterator<Item = Time> + '_ {
        (0..self.len).map(move |index| self.time_at(index))
    }

    /// Index of the last grid point not after `t`, clamped to the grid.
    pub fn floor_index(&self, t: &Time) -> usize {
        if !t.is_positive() {
            return 0;
        }
        (t / &self.step)
            .floor()
            .to_integer()
            .to_usize()
            .map_or(self.len - 1, |index| index.min(self.len - 1))
    }

    /// Index of the first grid point not before `t`, clamped to the grid.
    pub fn ceil_index(&self, t: &Time) -> usize {
        if !t.is_positive() {
            return 0;
        }
        (t / &self.step)
            .ceil()
            .to_integer()
            .to_usize()
            .map_or(self.len - 1, |index| index.min(self.len - 1))
    }
}

/// Cumulative distribution function sampled on a uniform grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cdf {
    step: f64,
    values: Vec<f64>,
}

impl Cdf {
    pub fn new(step: f64, values: Vec<f64>) -> Self {
        Self { step, values }
    }

    pub fn zeros(grid: &TimeGrid) -> Self {
        Self::new(grid.step_f64(), vec![0.0; grid.len()])
    }

    /// Sample `f` at every grid point.
    pub fn from_fn(grid: &TimeGrid, mut f: impl FnMut(&Time) -> f64) -> Self {
        let values = grid.times().map(|t| f(&t)).collect();
        Self::new(grid.step_f64(), values)
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn at(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Value at the time limit.
    pub fn last(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    /// Fail unless `other` is sampled on a grid of the same length.
    pub fn ensure_same_grid(&self, other: &Cdf) -> ModelResult<()> {
        if self.len() != other.len() {
            return Err(ModelError::GridMismatch {
                expected: self.len(),
                found: other.len(),
            });
        }
        Ok(())
    }

    /// Forward-difference density estimate; the first point carries `F(0)/step`.
    pub fn pdf(&self) -> Vec<f64> {
        let mut previous = 0.0;
        self.values
            .iter()
            .map(|&value| {
                let density = (value - previous) / self.step;
                previous = value;
                density
            })
            .collect()
    }

    /// Sup-norm distance to another CDF on the same grid.
    pub fn max_abs_diff(&self, other: &Cdf) -> ModelResult<f64> {
        self.ensure_same_grid(other)?;
        Ok(self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max))
    }

    /// Whether values never decrease by more than `tolerance`.
    pub fn is_monotone(&self, tolerance: f64) -> bool {
        self.values.windows(2).all(|w| w[1] + tolerance >= w[0])
    }

    /// Linear interpolation of this CDF onto `grid`; points past the end hold the last value.
    pub fn resample(&self, grid: &TimeGrid) -> Cdf {
        Cdf::from_fn(grid, |t| {
            if self.values.is_empty() {
                return 0.0;
            }
            let position = time_to_f64(t) / self.step;
            if position <= 0.0 {
                return self.values[0];
            }
            let lower = position.floor() as usize;
            if lower + 1 >= self.values.len() {
                return self.last();
            }
            let fraction = position - lower as f64;
            self.values[lower] * (1.0 - fraction) + self.values[lower + 1] * fraction
        })
    }

    /// Probability mass not yet absorbed at the time limit.
    pub fn residual_mass(&self) -> f64 {
        (1.0 - self.last()).max(0.0)
    }
}

impl Default for Cdf {
    fn default() -> Self {
        Self::new(1.0, Vec::new())
    }
}
