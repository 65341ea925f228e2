//! Record of the decisions taken while evaluating a model.

use sanet_core::{BlockKind, Cdf, Complexity};
use serde::{Deserialize, Serialize};

/// What the engine did with a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Leaf evaluated from its timing features.
    ClosedForm,
    /// XOR children combined by mixture.
    Mixture,
    /// AND children combined by product.
    Product,
    /// SEQ children combined by convolution.
    Convolution,
    /// Block handed to the oracle.
    Oracle,
    /// Block handed to the oracle because no rewrite applies.
    Fallback { reason: String },
    /// A block was fitted and replaced by a leaf surrogate.
    Surrogate {
        target: String,
        surrogate: String,
        fit_error: f64,
    },
    /// A DAG was evaluated through a nested AND of two copies.
    Replication { predecessor: String, nested: String },
}

/// One entry of the evaluation trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Recursion depth at which the decision was taken.
    pub depth: usize,
    pub block: String,
    pub kind: BlockKind,
    /// Measures that drove the decision, when they were consulted.
    pub complexity: Option<Complexity>,
    pub simplified: Option<Complexity>,
    #[serde(flatten)]
    pub action: Action,
}

/// Result of [`HeuristicEngine::evaluate`](crate::HeuristicEngine::evaluate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub cdf: Cdf,
    pub trace: Vec<Decision>,
}

impl Evaluation {
    /// Number of surrogate replacements performed.
    pub fn surrogates(&self) -> usize {
        self.trace
            .iter()
            .filter(|d| matches!(d.action, Action::Surrogate { .. }))
            .count()
    }

    /// Number of blocks handed to the oracle, fallbacks included.
    pub fn oracle_calls(&self) -> usize {
        self.trace
            .iter()
            .filter(|d| matches!(d.action, Action::Oracle | Action::Fallback { .. }))
            .count()
    }

    /// Number of replication steps.
    pub fn replications(&self) -> usize {
        self.trace
            .iter()
            .filter(|d| matches!(d.action, Action::Replication { .. }))
            .count()
    }

    /// Largest sup-norm error reported by any surrogate fit.
    pub fn max_fit_error(&self) -> f64 {
        self.trace
            .iter()
            .filter_map(|d| match d.action {
                Action::Surrogate { fit_error, .. } => Some(fit_error),
                _ => None,
            })
            .fold(0.0, f64::max)
    }

    /// Serialize the trace as pretty JSON.
    pub fn trace_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.trace)
    }
}
