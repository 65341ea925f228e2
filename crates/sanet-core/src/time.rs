//! Exact time values and possibly-infinite time bounds.
//!
//! Durations are parsed from decimal literals into [`BigRational`] so that
//! support bounds, grid points and deterministic delays compare exactly
//! (`"0.1"` is `1/10`, not the nearest binary float).

use std::fmt;

use num::{BigInt, BigRational, One, ToPrimitive, Zero};

use crate::error::{ModelError, ModelResult};

/// Exact, non-negative time value.
pub type Time = BigRational;

/// Parse a decimal literal such as `"3"`, `"0.25"` or `"-1.5"` into an exact time.
pub fn parse_time(text: &str) -> ModelResult<Time> {
    let invalid = || ModelError::InvalidTime {
        value: text.to_string(),
    };

    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return Err(invalid());
    }

    let numer: BigInt = format!("{whole}{fraction}").parse().map_err(|_| invalid())?;
    let denom = num::pow(BigInt::from(10u32), fraction.len());
    let value = BigRational::new(numer, denom);
    Ok(if negative { -value } else { value })
}

/// Exact time from an integer count of time units.
pub fn time_from_int(value: i64) -> Time {
    BigRational::from_integer(BigInt::from(value))
}

/// Nearest `f64` to an exact time.
pub fn time_to_f64(value: &Time) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// Upper end of a support interval, which may be unbounded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeBound {
    Finite(Time),
    Infinite,
}

impl TimeBound {
    pub fn zero() -> Self {
        TimeBound::Finite(Time::zero())
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, TimeBound::Finite(_))
    }

    pub fn finite(&self) -> Option<&Time> {
        match self {
            TimeBound::Finite(value) => Some(value),
            TimeBound::Infinite => None,
        }
    }

    /// Sum of two bounds; anything plus infinity is infinity.
    pub fn add(&self, other: &TimeBound) -> TimeBound {
        match (self, other) {
            (TimeBound::Finite(a), TimeBound::Finite(b)) => TimeBound::Finite(a + b),
            _ => TimeBound::Infinite,
        }
    }

    /// Replace an infinite bound with `limit`.
    pub fn or_limit(&self, limit: &Time) -> Time {
        match self {
            TimeBound::Finite(value) => value.clone(),
            TimeBound::Infinite => limit.clone(),
        }
    }

    /// Smaller of the bound and `limit`.
    pub fn clamp_to(&self, limit: &Time) -> Time {
        match self {
            TimeBound::Finite(value) if value < limit => value.clone(),
            _ => limit.clone(),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            TimeBound::Finite(value) => time_to_f64(value),
            TimeBound::Infinite => f64::INFINITY,
        }
    }
}

impl From<Time> for TimeBound {
    fn from(value: Time) -> Self {
        TimeBound::Finite(value)
    }
}

impl fmt::Display for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBound::Finite(value) => write!(f, "{value}"),
            TimeBound::Infinite => write!(f, "inf"),
        }
    }
}

/// Smallest power of ten `10^k` with `k >= 0` such that `bound / 10^k <= 10`,
/// divided by 100.
///
/// Used as the discretization step when a block is analyzed on its own
/// support. Bounds of 10 or less all get a step of 0.01.
pub fn adaptive_step(bound: &Time) -> Time {
    let ten = time_from_int(10);
    let mut scale = Time::one();
    if bound.is_zero() || bound < &Time::zero() {
        return scale / time_from_int(100);
    }
    while bound / &scale > ten {
        scale = &scale * &ten;
    }
    scale / time_from_int(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_is_exact() {
        let tenth = parse_time("0.1").unwrap();
        assert_eq!(tenth, BigRational::new(BigInt::from(1), BigInt::from(10)));
        assert_eq!(parse_time("3").unwrap(), time_from_int(3));
        assert_eq!(parse_time("-1.5").unwrap(), -parse_time("1.5").unwrap());
        assert_eq!(parse_time(".5").unwrap(), parse_time("0.5").unwrap());
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(parse_time("").is_err());
        assert!(parse_time(".").is_err());
        assert!(parse_time("1e3").is_err());
        assert!(parse_time("1.2.3").is_err());
    }

    #[test]
    fn test_bounds_ordering_and_sum() {
        let one = TimeBound::from(time_from_int(1));
        assert!(one < TimeBound::Infinite);
        assert_eq!(one.add(&one), TimeBound::from(time_from_int(2)));
        assert_eq!(one.add(&TimeBound::Infinite), TimeBound::Infinite);
        assert_eq!(TimeBound::Infinite.or_limit(&time_from_int(7)), time_from_int(7));
        assert_eq!(one.clamp_to(&time_from_int(7)), time_from_int(1));
    }

    #[test]
    fn test_adaptive_step() {
        assert_eq!(adaptive_step(&time_from_int(4)), parse_time("0.01").unwrap());
        assert_eq!(adaptive_step(&time_from_int(10)), parse_time("0.01").unwrap());
        assert_eq!(adaptive_step(&time_from_int(35)), parse_time("0.1").unwrap());
        assert_eq!(adaptive_step(&time_from_int(250)), parse_time("1").unwrap());
        assert_eq!(adaptive_step(&parse_time("0.5").unwrap()), parse_time("0.01").unwrap());
        assert_eq!(adaptive_step(&parse_time("0.003").unwrap()), parse_time("0.01").unwrap());
    }
}
