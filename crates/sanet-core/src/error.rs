//! Error types for building, editing and measuring activity graphs.

use thiserror::Error;

use crate::activity::ActivityId;

/// Result type alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while constructing or transforming an activity graph.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A composite block was created without children.
    #[error("block {name} has no children")]
    EmptyBlock { name: String },

    /// The number of XOR probabilities does not match the alternatives.
    #[error("xor {name} has {alternatives} alternatives but {probabilities} probabilities")]
    ProbabilityMismatch {
        name: String,
        alternatives: usize,
        probabilities: usize,
    },

    /// A branch or continuation probability is outside its valid range.
    #[error("invalid probability {value} for {name}")]
    InvalidProbability { name: String, value: f64 },

    /// Adding a precedence edge would close a cycle.
    #[error("precedence {from} -> {to} would create a cycle")]
    Cycle { from: String, to: String },

    /// Activity names must be unique within a graph.
    #[error("duplicate activity name: {name}")]
    DuplicateName { name: String },

    /// An activity id does not refer to a live node.
    #[error("activity not found: {id}")]
    UnknownActivity { id: ActivityId },

    /// An operation needed a block of a different kind.
    #[error("{name} is a {found} block, expected {expected}")]
    UnexpectedKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The child is already owned by another block or linked into a DAG.
    #[error("activity {name} is already attached")]
    AlreadyAttached { name: String },

    /// A structural edit cannot be applied.
    #[error("invalid edit on {name}: {message}")]
    InvalidEdit { name: String, message: String },

    /// Well-formedness check failed.
    #[error("malformed block {name}: {}", .problems.join("; "))]
    Malformed { name: String, problems: Vec<String> },

    /// A timing feature could not be constructed.
    #[error("invalid timing feature: {message}")]
    InvalidTimingFeature { message: String },

    /// A time literal could not be parsed.
    #[error("invalid time value: {value:?}")]
    InvalidTime { value: String },

    /// Two arrays that must share a grid have different lengths.
    #[error("grid mismatch: expected {expected} points, found {found}")]
    GridMismatch { expected: usize, found: usize },

    /// A time grid was specified with a non-positive step or negative limit.
    #[error("invalid grid: {message}")]
    InvalidGrid { message: String },

    /// A combinator was applied to no inputs.
    #[error("cannot combine an empty set of distributions")]
    EmptyCombination,
}
