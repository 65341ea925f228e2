//! Structural complexity measures used to steer the analysis.
//!
//! Two measures are defined for every block:
//!
//! - **C** (parallelism): leaf = 1, AND = sum, SEQ and XOR = max, REPEAT = body,
//!   DAG = maximum-weight antichain of its members weighted by their C.
//! - **R** (regeneration effort): leaf = 1, SEQ and AND = sum, XOR = max,
//!   REPEAT = body R times the expected iterations `ceil(1/(1-p))`,
//!   DAG = maximum-weight antichain weighted by R.
//!
//! The *simplified* variants apply the same rules with every direct child
//! counted as a unit leaf. When a block's simplified measures equal its full
//! measures, replacing its children with surrogates cannot reduce its cost.
//!
//! Values are cached per graph revision, so any mutation invalidates them.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use num::{BigUint, One, Zero};
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityId, ActivityKind};
use crate::error::ModelResult;
use crate::graph::ActivityGraph;
use crate::traversal::Direction;

/// Pair of complexity measures, ordered by C first and R second.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Complexity {
    #[serde(with = "crate::measure_serde")]
    pub c: BigUint,
    #[serde(with = "crate::measure_serde")]
    pub r: BigUint,
}

impl Complexity {
    pub fn new(c: impl Into<BigUint>, r: impl Into<BigUint>) -> Self {
        Self {
            c: c.into(),
            r: r.into(),
        }
    }

    pub fn unit() -> Self {
        Self::new(1u32, 1u32)
    }

    /// Whether either measure exceeds one.
    pub fn is_complex(&self) -> bool {
        self.c > BigUint::one() || self.r > BigUint::one()
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C={} R={}", self.c, self.r)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Mode {
    Full,
    Simplified,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MeasureCache {
    revision: u64,
    entries: HashMap<(ActivityId, Mode), Complexity>,
}

/// `ceil(1 / (1 - p))`, the expected number of body executions.
pub fn expected_iterations(probability: f64) -> BigUint {
    let expected = 1.0 / (1.0 - probability);
    // Guard against 1/(1-0.9) landing just above 10.
    let rounded = (expected - 1e-9).ceil().max(1.0);
    BigUint::from(rounded as u64)
}

impl ActivityGraph {
    pub fn complexity(&self, id: ActivityId) -> ModelResult<Complexity> {
        self.measure(id, Mode::Full)
    }

    pub fn simplified_complexity(&self, id: ActivityId) -> ModelResult<Complexity> {
        self.measure(id, Mode::Simplified)
    }

    pub fn c(&self, id: ActivityId) -> ModelResult<BigUint> {
        Ok(self.complexity(id)?.c)
    }

    pub fn r(&self, id: ActivityId) -> ModelResult<BigUint> {
        Ok(self.complexity(id)?.r)
    }

    pub fn simplified_c(&self, id: ActivityId) -> ModelResult<BigUint> {
        Ok(self.simplified_complexity(id)?.c)
    }

    pub fn simplified_r(&self, id: ActivityId) -> ModelResult<BigUint> {
        Ok(self.simplified_complexity(id)?.r)
    }

    /// Drop every cached measure.
    pub fn reset_complexity_measures(&self) {
        let mut cache = self.measures.borrow_mut();
        cache.entries.clear();
        cache.revision = self.revision();
    }

    fn measure(&self, id: ActivityId, mode: Mode) -> ModelResult<Complexity> {
        {
            let mut cache = self.measures.borrow_mut();
            if cache.revision != self.revision() {
                cache.entries.clear();
                cache.revision = self.revision();
            }
            if let Some(hit) = cache.entries.get(&(id, mode)) {
                return Ok(hit.clone());
            }
        }
        let value = match mode {
            Mode::Full => self.full_measure(id)?,
            Mode::Simplified => self.simplified_measure(id)?,
        };
        self.measures
            .borrow_mut()
            .entries
            .insert((id, mode), value.clone());
        Ok(value)
    }

    fn full_measure(&self, id: ActivityId) -> ModelResult<Complexity> {
        let parts = |ids: &[ActivityId]| -> ModelResult<Vec<Complexity>> {
            ids.iter().map(|&child| self.complexity(child)).collect()
        };
        Ok(match self.get(id)?.kind() {
            ActivityKind::Simple { .. } => Complexity::unit(),
            ActivityKind::Sequence { children } => {
                let parts = parts(children)?;
                Complexity {
                    c: max_of(parts.iter().map(|p| &p.c)),
                    r: parts.iter().map(|p| &p.r).sum(),
                }
            }
            ActivityKind::And { children } => {
                let parts = parts(children)?;
                Complexity {
                    c: parts.iter().map(|p| &p.c).sum(),
                    r: parts.iter().map(|p| &p.r).sum(),
                }
            }
            ActivityKind::Xor { alternatives, .. } => {
                let parts = parts(alternatives)?;
                Complexity {
                    c: max_of(parts.iter().map(|p| &p.c)),
                    r: max_of(parts.iter().map(|p| &p.r)),
                }
            }
            ActivityKind::Repeat { body, probability } => {
                let body = self.complexity(*body)?;
                Complexity {
                    c: body.c,
                    r: body.r * expected_iterations(*probability),
                }
            }
            ActivityKind::Dag { .. } => {
                let members = self.members(id)?;
                let parts = parts(&members)?;
                let c: Vec<BigUint> = parts.iter().map(|p| p.c.clone()).collect();
                let r: Vec<BigUint> = parts.into_iter().map(|p| p.r).collect();
                Complexity {
                    c: self.max_weight_antichain(&members, &c),
                    r: self.max_weight_antichain(&members, &r),
                }
            }
        })
    }

    fn simplified_measure(&self, id: ActivityId) -> ModelResult<Complexity> {
        Ok(match self.get(id)?.kind() {
            ActivityKind::Simple { .. } | ActivityKind::Xor { .. } => Complexity::unit(),
            ActivityKind::Sequence { children } => Complexity::new(1u32, children.len()),
            ActivityKind::And { children } => Complexity::new(children.len(), children.len()),
            ActivityKind::Repeat { probability, .. } => Complexity {
                c: BigUint::one(),
                r: expected_iterations(*probability),
            },
            ActivityKind::Dag { .. } => {
                let members = self.members(id)?;
                let width = self.max_weight_antichain(&members, &vec![BigUint::one(); members.len()]);
                Complexity {
                    c: width.clone(),
                    r: width,
                }
            }
        })
    }

    /// Largest total weight of pairwise unordered members.
    ///
    /// Weighted Dilworth: the answer is the total weight minus a maximum flow
    /// from `s -> L_i` (weight `w_i`) through `L_i -> R_j` (unbounded, when `i`
    /// precedes `j`) to `R_j -> t` (weight `w_j`).
    fn max_weight_antichain(&self, members: &[ActivityId], weights: &[BigUint]) -> BigUint {
        let n = members.len();
        if n == 0 {
            return BigUint::zero();
        }
        let index: HashMap<ActivityId, usize> =
            members.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let total: BigUint = weights.iter().sum();
        let unbounded = &total + BigUint::one();

        let size = 2 * n + 2;
        let (source, sink) = (0, size - 1);
        let mut capacity = vec![vec![BigUint::zero(); size]; size];
        for (i, &id) in members.iter().enumerate() {
            capacity[source][1 + i] = weights[i].clone();
            capacity[1 + n + i][sink] = weights[i].clone();
            for later in self.reachable(id, Direction::Forward) {
                if let Some(&j) = index.get(&later) {
                    if j != i {
                        capacity[1 + i][1 + n + j] = unbounded.clone();
                    }
                }
            }
        }
        let flow = max_flow(&mut capacity, source, sink);
        total - flow
    }
}

fn max_of<'a>(values: impl Iterator<Item = &'a BigUint>) -> BigUint {
    values.max().cloned().unwrap_or_else(BigUint::zero)
}

/// Edmonds-Karp on a dense residual capacity matrix.
fn max_flow(capacity: &mut [Vec<BigUint>], source: usize, sink: usize) -> BigUint {
    let size = capacity.len();
    let mut total = BigUint::zero();
    loop {
        let mut parent: Vec<Option<usize>> = vec![None; size];
        parent[source] = Some(source);
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            if u == sink {
                break;
            }
            for v in 0..size {
                if parent[v].is_none() && !capacity[u][v].is_zero() {
                    parent[v] = Some(u);
                    queue.push_back(v);
                }
            }
        }
        if parent[sink].is_none() {
            return total;
        }

        let mut path = Vec::new();
        let mut v = sink;
        while v != source {
            let Some(u) = parent[v] else {
                return total;
            };
            path.push((u, v));
            v = u;
        }
        let Some(bottleneck) = path.iter().map(|&(u, v)| &capacity[u][v]).min().cloned() else {
            return total;
        };
        for (u, v) in path {
            capacity[u][v] -= &bottleneck;
            capacity[v][u] += &bottleneck;
        }
        total += bottleneck;
    }
}
