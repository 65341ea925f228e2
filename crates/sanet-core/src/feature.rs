//! Timing features of analytical (leaf) activities.
//!
//! A leaf activity carries a weighted mixture of [`TimingFeature`]s. Exact
//! support bounds stay rational; CDF and quantile evaluation goes through
//! `statrs` distributions.

use num::{Signed, Zero};
use statrs::distribution::{ContinuousCDF, Exp, Uniform};

use crate::error::{ModelError, ModelResult};
use crate::grid::{Cdf, TimeGrid};
use crate::time::{time_to_f64, Time, TimeBound};

/// Tolerance on the total weight of a mixture.
const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Duration distribution of a single timed transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TimingFeature {
    /// Fixed delay.
    Deterministic(Time),
    /// Uniform delay on `[eft, lft]`.
    Uniform { eft: Time, lft: Time, dist: Uniform },
    /// Exponential delay starting at zero.
    Exponential(Exp),
    /// Exponential delay starting at `shift`.
    ShiftedExponential { shift: Time, dist: Exp },
}

impl TimingFeature {
    pub fn deterministic(value: Time) -> ModelResult<Self> {
        if value.is_negative() {
            return Err(ModelError::InvalidTimingFeature {
                message: format!("negative deterministic delay {value}"),
            });
        }
        Ok(TimingFeature::Deterministic(value))
    }

    /// Uniform delay; a zero-width interval collapses to a deterministic one.
    pub fn uniform(eft: Time, lft: Time) -> ModelResult<Self> {
        if eft.is_negative() || lft < eft {
            return Err(ModelError::InvalidTimingFeature {
                message: format!("invalid uniform support [{eft}, {lft}]"),
            });
        }
        if eft == lft {
            return Ok(TimingFeature::Deterministic(eft));
        }
        let dist = Uniform::new(time_to_f64(&eft), time_to_f64(&lft)).map_err(|e| {
            ModelError::InvalidTimingFeature {
                message: e.to_string(),
            }
        })?;
        Ok(TimingFeature::Uniform { eft, lft, dist })
    }

    pub fn exponential(rate: f64) -> ModelResult<Self> {
        Ok(TimingFeature::Exponential(exp_dist(rate)?))
    }

    pub fn shifted_exponential(shift: Time, rate: f64) -> ModelResult<Self> {
        if shift.is_negative() {
            return Err(ModelError::InvalidTimingFeature {
                message: format!("negative shift {shift}"),
            });
        }
        Ok(TimingFeature::ShiftedExponential {
            shift,
            dist: exp_dist(rate)?,
        })
    }

    /// Short name used in traces and logs.
    pub fn label(&self) -> &'static str {
        match self {
            TimingFeature::Deterministic(_) => "deterministic",
            TimingFeature::Uniform { .. } => "uniform",
            TimingFeature::Exponential(_) => "exponential",
            TimingFeature::ShiftedExponential { .. } => "shifted_exponential",
        }
    }

    /// Earliest and latest firing times.
    pub fn support(&self) -> (Time, TimeBound) {
        match self {
            TimingFeature::Deterministic(value) => (value.clone(), value.clone().into()),
            TimingFeature::Uniform { eft, lft, .. } => (eft.clone(), lft.clone().into()),
            TimingFeature::Exponential(_) => (Time::zero(), TimeBound::Infinite),
            TimingFeature::ShiftedExponential { shift, .. } => {
                (shift.clone(), TimeBound::Infinite)
            }
        }
    }

    /// `P(duration <= t)`.
    pub fn cdf(&self, t: &Time) -> f64 {
        match self {
            TimingFeature::Deterministic(value) => {
                if t >= value {
                    1.0
                } else {
                    0.0
                }
            }
            TimingFeature::Uniform { eft, lft, dist } => {
                if t <= eft {
                    0.0
                } else if t >= lft {
                    1.0
                } else {
                    dist.cdf(time_to_f64(t))
                }
            }
            TimingFeature::Exponential(dist) => {
                if t.is_positive() {
                    dist.cdf(time_to_f64(t))
                } else {
                    0.0
                }
            }
            TimingFeature::ShiftedExponential { shift, dist } => {
                if t > shift {
                    dist.cdf(time_to_f64(&(t - shift)))
                } else {
                    0.0
                }
            }
        }
    }

    /// Inverse CDF for `p` in `[0, 1)`.
    pub fn quantile(&self, p: f64) -> f64 {
        match self {
            TimingFeature::Deterministic(value) => time_to_f64(value),
            TimingFeature::Uniform { dist, .. } => dist.inverse_cdf(p),
            TimingFeature::Exponential(dist) => dist.inverse_cdf(p),
            TimingFeature::ShiftedExponential { shift, dist } => {
                time_to_f64(shift) + dist.inverse_cdf(p)
            }
        }
    }
}

fn exp_dist(rate: f64) -> ModelResult<Exp> {
    Exp::new(rate).map_err(|e| ModelError::InvalidTimingFeature {
        message: format!("rate {rate}: {e}"),
    })
}

/// Component of a leaf activity's mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedFeature {
    pub weight: f64,
    pub feature: TimingFeature,
}

impl WeightedFeature {
    pub fn new(weight: f64, feature: TimingFeature) -> Self {
        Self { weight, feature }
    }
}

/// Check that a mixture is non-empty with non-negative weights summing to one.
pub fn validate_mixture(name: &str, features: &[WeightedFeature]) -> ModelResult<()> {
    if features.is_empty() {
        return Err(ModelError::EmptyBlock {
            name: name.to_string(),
        });
    }
    let mut total = 0.0;
    for component in features {
        if !component.weight.is_finite() || component.weight < 0.0 {
            return Err(ModelError::InvalidProbability {
                name: name.to_string(),
                value: component.weight,
            });
        }
        total += component.weight;
    }
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ModelError::InvalidProbability {
            name: name.to_string(),
            value: total,
        });
    }
    Ok(())
}

/// Union of the supports of the components that carry weight.
pub fn mixture_support(features: &[WeightedFeature]) -> (Time, TimeBound) {
    let mut lower: Option<Time> = None;
    let mut upper = TimeBound::zero();
    for component in features.iter().filter(|c| c.weight > 0.0) {
        let (eft, lft) = component.feature.support();
        lower = Some(match lower {
            Some(current) if current <= eft => current,
            _ => eft,
        });
        if lft > upper {
            upper = lft;
        }
    }
    (lower.unwrap_or_else(Time::zero), upper)
}

/// Closed-form CDF of a mixture sampled on `grid`.
pub fn mixture_cdf(features: &[WeightedFeature], grid: &TimeGrid) -> Cdf {
    Cdf::from_fn(grid, |t| {
        features
            .iter()
            .map(|c| c.weight * c.feature.cdf(t))
            .sum::<f64>()
            .clamp(0.0, 1.0)
    })
}
