//! Complexity-driven evaluation of stochastic activity networks.
//!
//! This crate computes the completion-time CDF of an activity block from
//! [`sanet_core`]. Blocks that are cheap to evaluate are combined numerically;
//! the rest are handed to an external [`TransientOracle`], after being
//! rewritten until their concurrency (C) and regeneration (R) measures fall
//! below configured thresholds.
//!
//! ## Core Concepts
//!
//! - **Oracle**: back end computing the exact or simulated CDF of one block
//! - **Approximator**: fits a timing-feature mixture to a sampled CDF
//! - **Surrogate**: leaf activity standing in for a fitted block
//! - **Replication**: evaluating a DAG as the AND of a pruned copy and the
//!   prefix of one end predecessor
//!
//! ## Decision Flow
//!
//! ```text
//! Simple -> closed form
//! XOR    -> mixture      AND -> product      SEQ -> convolution
//! Repeat -> surrogate for the body while over threshold, then oracle
//! DAG    -> surrogates for repetitions,
//!           then surrogates for inner blocks while over threshold,
//!           then replication while simplified measures are high,
//!           then oracle
//! ```
//!
//! Every decision is recorded in the [`Evaluation`] trace and logged through
//! `tracing`.

pub mod config;
mod error;
mod heuristic;
mod oracle;
pub mod search;
mod trace;

pub use config::{
    Combine, Comparison, Descend, HeuristicConfig, InnerBlockSearch, ReplicationMode,
    SurrogateStep, ThresholdPolicy,
};
pub use error::{EngineError, EngineResult, OracleError, OracleResult};
pub use heuristic::HeuristicEngine;
pub use oracle::{Approximator, TransientOracle};
pub use trace::{Action, Decision, Evaluation};
