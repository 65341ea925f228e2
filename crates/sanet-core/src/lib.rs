//! Structural model of stochastic activity networks.
//!
//! A model is a hierarchy of activities stored in one [`ActivityGraph`]:
//! leaves carry timing features, composites combine children as a sequence,
//! a fork-join (AND), an exclusive choice (XOR), a repetition, or a general
//! precedence DAG between fictitious begin and end nodes.
//!
//! ## Contents
//!
//! - **Model**: [`ActivityGraph`] factories, queries and structural edits
//!   (`replace`, `copy_between`, `nest`, `flatten`, `remove_between`)
//! - **Time**: exact rational [`Time`] values and [`TimeBound`]s
//! - **Measures**: the C and R [`Complexity`] measures with their simplified variants
//! - **Numerics**: [`TimeGrid`], sampled [`Cdf`]s and the XOR/AND/SEQ
//!   [`combinators`]
//!
//! ```text
//! P = DAG
//!   BEGIN -> Q, R, S
//!   Q, R  -> U
//!   R, S  -> V
//!   U, V  -> END
//! ```

mod activity;
pub mod combinators;
mod complexity;
mod editing;
mod error;
mod feature;
mod graph;
mod grid;
pub mod measure_serde;
mod time;
mod traversal;

pub use activity::{Activity, ActivityId, ActivityKind, BlockKind};
pub use complexity::{expected_iterations, Complexity};
pub use error::{ModelError, ModelResult};
pub use feature::{mixture_cdf, mixture_support, validate_mixture, TimingFeature, WeightedFeature};
pub use graph::ActivityGraph;
pub use grid::{Cdf, TimeGrid};
pub use time::{adaptive_step, parse_time, time_from_int, time_to_f64, Time, TimeBound};
pub use traversal::{DepthFirst, Direction, VisitEvent};
