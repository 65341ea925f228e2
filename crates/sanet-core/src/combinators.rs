//! Grid-level combinators for the three well-nested block kinds.
//!
//! All inputs must be sampled on the same grid; a length mismatch is an error,
//! never silently truncated.

use crate::error::{ModelError, ModelResult};
use crate::grid::Cdf;

/// XOR: probability-weighted mixture `sum_i p_i * F_i`.
pub fn mixture(branches: &[(f64, Cdf)]) -> ModelResult<Cdf> {
    let (_, first) = branches.first().ok_or(ModelError::EmptyCombination)?;
    let mut values = vec![0.0; first.len()];
    for (probability, cdf) in branches {
        first.ensure_same_grid(cdf)?;
        for (acc, value) in values.iter_mut().zip(cdf.values()) {
            *acc += probability * value;
        }
    }
    Ok(Cdf::new(first.step(), values))
}

/// AND: pointwise product `prod_i F_i`.
///
/// Exact for independent branches; shared upstream activities are ignored.
pub fn product(branches: &[Cdf]) -> ModelResult<Cdf> {
    let first = branches.first().ok_or(ModelError::EmptyCombination)?;
    let mut values = vec![1.0; first.len()];
    for cdf in branches {
        first.ensure_same_grid(cdf)?;
        for (acc, value) in values.iter_mut().zip(cdf.values()) {
            *acc *= value;
        }
    }
    Ok(Cdf::new(first.step(), values))
}

/// SEQ: trapezoidal convolution of two CDFs on the same grid.
///
/// `out[x] = F[0]*G[x] + sum_{u=1..x} (F[u]-F[u-1]) * (G[x-u+1] + G[x-u]) / 2`.
/// The first term keeps an atom of `F` at zero; it vanishes when `F[0] = 0`.
pub fn convolve(first: &Cdf, second: &Cdf) -> ModelResult<Cdf> {
    first.ensure_same_grid(second)?;
    let f = first.values();
    let g = second.values();
    let values = (0..f.len())
        .map(|x| {
            let mut acc = f[0] * g[x];
            for u in 1..=x {
                acc += (f[u] - f[u - 1]) * (g[x - u + 1] + g[x - u]) / 2.0;
            }
            acc
        })
        .collect();
    Ok(Cdf::new(first.step(), values))
}

/// Left fold of [`convolve`] over a sequence of phases.
pub fn convolve_all(phases: &[Cdf]) -> ModelResult<Cdf> {
    let (head, tail) = phases.split_first().ok_or(ModelError::EmptyCombination)?;
    tail.iter()
        .try_fold(head.clone(), |acc, next| convolve(&acc, next))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_at(len: usize, at: usize) -> Cdf {
        Cdf::new(1.0, (0..len).map(|i| if i >= at { 1.0 } else { 0.0 }).collect())
    }

    #[test]
    fn test_convolution_of_deterministic_delays_adds() {
        let result = convolve(&step_at(8, 2), &step_at(8, 3)).unwrap();
        // The trapezoid rule splits the jump across the preceding step.
        assert_eq!(result.at(3), Some(0.0));
        assert_eq!(result.at(4), Some(0.5));
        assert_eq!(result.at(5), Some(1.0));
    }

    #[test]
    fn test_convolution_keeps_atom_at_zero() {
        let immediate = step_at(5, 0);
        let other = Cdf::new(1.0, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let result = convolve(&immediate, &other).unwrap();
        assert_eq!(result.values(), other.values());
    }

    #[test]
    fn test_mixture_and_product() {
        let a = Cdf::new(1.0, vec![0.0, 0.5, 1.0]);
        let b = Cdf::new(1.0, vec![0.0, 1.0, 1.0]);
        let xor = mixture(&[(0.5, a.clone()), (0.5, b.clone())]).unwrap();
        assert_eq!(xor.values(), &[0.0, 0.75, 1.0]);
        let and = product(&[a, b]).unwrap();
        assert_eq!(and.values(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_grid_mismatch_is_fatal() {
        let a = Cdf::new(1.0, vec![0.0, 1.0]);
        let b = Cdf::new(1.0, vec![0.0, 0.5, 1.0]);
        assert!(matches!(
            convolve(&a, &b),
            Err(ModelError::GridMismatch { expected: 2, found: 3 })
        ));
        assert!(product(&[a.clone(), b.clone()]).is_err());
        assert!(mixture(&[(0.5, a), (0.5, b)]).is_err());
        assert!(matches!(product(&[]), Err(ModelError::EmptyCombination)));
    }
}
