//! Activities: the nodes of an activity graph.

use std::fmt;

use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::feature::WeightedFeature;
use crate::time::{Time, TimeBound};

/// Handle to an activity stored in an [`ActivityGraph`](crate::ActivityGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityId(pub(crate) NodeIndex);

impl ActivityId {
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.index())
    }
}

/// Kind tag of an activity, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Simple,
    Sequence,
    And,
    Xor,
    Repeat,
    Dag,
}

impl BlockKind {
    pub fn label(&self) -> &'static str {
        match self {
            BlockKind::Simple => "simple",
            BlockKind::Sequence => "sequence",
            BlockKind::And => "and",
            BlockKind::Xor => "xor",
            BlockKind::Repeat => "repeat",
            BlockKind::Dag => "dag",
        }
    }

    pub fn is_composite(&self) -> bool {
        !matches!(self, BlockKind::Simple)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Structure of an activity.
///
/// Composite variants own their children; DAG members are the activities
/// whose parent is the DAG, ordered by the precedence edges between them.
#[derive(Debug, Clone)]
pub enum ActivityKind {
    /// Leaf with a weighted mixture of timing features.
    Simple { features: Vec<WeightedFeature> },
    /// Children run one after another.
    Sequence { children: Vec<ActivityId> },
    /// Children run in parallel; completes when all complete.
    And { children: Vec<ActivityId> },
    /// Exactly one alternative runs, chosen with the matching probability.
    Xor {
        alternatives: Vec<ActivityId>,
        probs: Vec<f64>,
    },
    /// Body runs once, then again with `probability` after each completion.
    Repeat { body: ActivityId, probability: f64 },
    /// General precedence DAG between a fictitious begin and end.
    Dag { begin: ActivityId, end: ActivityId },
}

impl ActivityKind {
    pub fn block_kind(&self) -> BlockKind {
        match self {
            ActivityKind::Simple { .. } => BlockKind::Simple,
            ActivityKind::Sequence { .. } => BlockKind::Sequence,
            ActivityKind::And { .. } => BlockKind::And,
            ActivityKind::Xor { .. } => BlockKind::Xor,
            ActivityKind::Repeat { .. } => BlockKind::Repeat,
            ActivityKind::Dag { .. } => BlockKind::Dag,
        }
    }

    /// Swap a direct child reference; DAG membership is tracked by parent links instead.
    pub(crate) fn substitute_child(&mut self, old: ActivityId, new: ActivityId) {
        let slots = match self {
            ActivityKind::Sequence { children } | ActivityKind::And { children } => children,
            ActivityKind::Xor { alternatives, .. } => alternatives,
            ActivityKind::Repeat { body, .. } => {
                if *body == old {
                    *body = new;
                }
                return;
            }
            ActivityKind::Simple { .. } | ActivityKind::Dag { .. } => return,
        };
        for slot in slots.iter_mut().filter(|slot| **slot == old) {
            *slot = new;
        }
    }
}

/// A node of the activity graph.
#[derive(Debug, Clone)]
pub struct Activity {
    pub(crate) name: String,
    pub(crate) eft: Time,
    pub(crate) lft: TimeBound,
    pub(crate) kind: ActivityKind,
    pub(crate) parent: Option<ActivityId>,
}

impl Activity {
    pub(crate) fn new(name: String, eft: Time, lft: TimeBound, kind: ActivityKind) -> Self {
        Self {
            name,
            eft,
            lft,
            kind,
            parent: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Earliest completion time.
    pub fn eft(&self) -> &Time {
        &self.eft
    }

    /// Latest completion time.
    pub fn lft(&self) -> &TimeBound {
        &self.lft
    }

    pub fn kind(&self) -> &ActivityKind {
        &self.kind
    }

    pub fn block_kind(&self) -> BlockKind {
        self.kind.block_kind()
    }

    /// Enclosing block, `None` for roots and detached activities.
    pub fn parent(&self) -> Option<ActivityId> {
        self.parent
    }

    pub fn is_simple(&self) -> bool {
        matches!(self.kind, ActivityKind::Simple { .. })
    }

    pub fn features(&self) -> Option<&[WeightedFeature]> {
        match &self.kind {
            ActivityKind::Simple { features } => Some(features),
            _ => None,
        }
    }
}
