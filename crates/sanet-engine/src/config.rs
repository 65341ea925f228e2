//! Configuration for the heuristic engine.
//!
//! Configurations are plain serde structs and can be read from or written to
//! JSON and TOML files. Every field has a default, so partial files are fine.

use std::path::Path;

use num::BigUint;
use sanet_core::{measure_serde, Complexity};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// How a single measure is compared with its threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Strictly greater than the threshold.
    #[default]
    Exceeds,
    /// Greater than or equal to the threshold.
    Reaches,
}

/// How the C and R comparisons are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    /// Either measure is enough.
    #[default]
    Either,
    /// Both measures must trigger.
    Both,
}

/// Threshold test applied to a pair of measures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    #[serde(default)]
    pub comparison: Comparison,
    #[serde(default)]
    pub combine: Combine,
}

impl ThresholdPolicy {
    pub const fn new(comparison: Comparison, combine: Combine) -> Self {
        Self {
            comparison,
            combine,
        }
    }

    /// Whether `measure` triggers against the given thresholds.
    pub fn triggered(&self, measure: &Complexity, c_threshold: &BigUint, r_threshold: &BigUint) -> bool {
        let hit = |value: &BigUint, threshold: &BigUint| match self.comparison {
            Comparison::Exceeds => value > threshold,
            Comparison::Reaches => value >= threshold,
        };
        let c = hit(&measure.c, c_threshold);
        let r = hit(&measure.r, r_threshold);
        match self.combine {
            Combine::Either => c || r,
            Combine::Both => c && r,
        }
    }
}

/// Which selected blocks the inner-block search may descend into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Descend {
    /// Only into DAG and repetition blocks.
    #[default]
    Dags,
    /// Into any composite block.
    AnyComposite,
}

/// Search for the deepest complex block inside an over-threshold DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerBlockSearch {
    /// Test deciding whether the search goes one level deeper.
    #[serde(default = "default_descent_policy")]
    pub policy: ThresholdPolicy,
    #[serde(default)]
    pub descend: Descend,
}

fn default_descent_policy() -> ThresholdPolicy {
    ThresholdPolicy::new(Comparison::Exceeds, Combine::Both)
}

impl Default for InnerBlockSearch {
    fn default() -> Self {
        Self {
            policy: default_descent_policy(),
            descend: Descend::default(),
        }
    }
}

/// What happens to the nested block built by replication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMode {
    /// Analyze the nested AND as built.
    #[default]
    Nest,
    /// Replace both AND branches with fitted surrogates before combining them.
    NestAndApproximate,
}

/// Discretization step used when a block is analyzed for surrogate fitting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurrogateStep {
    /// Scaled to the block's latest finish time.
    #[default]
    Adaptive,
    /// Same step as the analysis grid.
    Grid,
}

/// Configuration for [`HeuristicEngine`](crate::HeuristicEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Concurrency threshold on C.
    #[serde(with = "measure_serde")]
    pub c_threshold: BigUint,

    /// Regeneration threshold on R.
    #[serde(with = "measure_serde")]
    pub r_threshold: BigUint,

    /// Error budget handed to oracle calls.
    pub error: f64,

    /// Log every decision at info level instead of debug.
    pub verbose: bool,

    /// Structural rewrites allowed per evaluation before falling back to the oracle.
    pub max_replacements: usize,

    pub replication_mode: ReplicationMode,

    pub surrogate_step: SurrogateStep,

    /// Whether a block is too complex for direct oracle analysis.
    pub dispatch_policy: ThresholdPolicy,

    /// Whether a DAG's simplified measures call for replication.
    pub replication_policy: ThresholdPolicy,

    pub inner_block: InnerBlockSearch,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            c_threshold: BigUint::from(3u32),
            r_threshold: BigUint::from(7u32),
            error: 0.001,
            verbose: false,
            max_replacements: 256,
            replication_mode: ReplicationMode::default(),
            surrogate_step: SurrogateStep::default(),
            dispatch_policy: ThresholdPolicy::new(Comparison::Exceeds, Combine::Either),
            replication_policy: ThresholdPolicy::new(Comparison::Reaches, Combine::Either),
            inner_block: InnerBlockSearch::default(),
        }
    }
}

impl HeuristicConfig {
    /// Default configuration with the given thresholds.
    pub fn with_thresholds(c_threshold: u64, r_threshold: u64) -> Self {
        Self {
            c_threshold: BigUint::from(c_threshold),
            r_threshold: BigUint::from(r_threshold),
            ..Default::default()
        }
    }

    /// Low thresholds: decompose early, keep oracle blocks small.
    pub fn aggressive() -> Self {
        Self {
            replication_mode: ReplicationMode::NestAndApproximate,
            ..Self::with_thresholds(2, 4)
        }
    }

    /// High thresholds: hand larger blocks to the oracle.
    pub fn exact_leaning() -> Self {
        Self {
            surrogate_step: SurrogateStep::Grid,
            ..Self::with_thresholds(6, 20)
        }
    }

    /// Whether the block is over threshold for direct oracle analysis.
    pub fn exceeds_thresholds(&self, measure: &Complexity) -> bool {
        self.dispatch_policy
            .triggered(measure, &self.c_threshold, &self.r_threshold)
    }

    /// Whether simplified measures call for replication.
    pub fn calls_for_replication(&self, simplified: &Complexity) -> bool {
        self.replication_policy
            .triggered(simplified, &self.c_threshold, &self.r_threshold)
    }

    /// Whether the inner-block search should descend into a block with these measures.
    pub fn descends_into(&self, measure: &Complexity) -> bool {
        self.inner_block
            .policy
            .triggered(measure, &self.c_threshold, &self.r_threshold)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |message: &str| {
            Err(EngineError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if self.c_threshold < BigUint::from(1u32) || self.r_threshold < BigUint::from(1u32) {
            return invalid("thresholds must be at least 1");
        }
        if !self.error.is_finite() || self.error <= 0.0 {
            return invalid("error budget must be positive");
        }
        if self.max_replacements == 0 {
            return invalid("max_replacements must be at least 1");
        }
        Ok(())
    }

    pub fn from_json_str(text: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from a `.toml` or `.json` file, chosen by extension.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        if is_toml(path) {
            Self::from_toml_str(&contents)
        } else {
            Self::from_json_str(&contents)
        }
    }

    /// Write to a `.toml` or `.json` file, chosen by extension.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = if is_toml(path) {
            self.to_toml_string()?
        } else {
            self.to_json_string()?
        };
        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}
