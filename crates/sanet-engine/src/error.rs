//! Error types for the heuristic engine and its oracles.

use thiserror::Error;

use sanet_core::ModelError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for oracle calls.
pub type OracleResult<T> = Result<T, OracleError>;

/// Failures reported by a stochastic oracle or an approximator.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The oracle cannot handle this kind of block or request.
    #[error("{operation} is not supported for {block}")]
    Unsupported { operation: String, block: String },

    /// A numerical procedure did not converge.
    #[error("no convergence: {message}")]
    NonConvergence { message: String },

    /// Inputs were rejected before any analysis ran.
    #[error("invalid oracle input: {message}")]
    InvalidInput { message: String },

    /// The model could not be read or the surrogate could not be built.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors that can occur while evaluating a model.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Structural or numerical model failure.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// An oracle failed on a specific block.
    #[error("oracle failed on {block}: {source}")]
    Oracle {
        block: String,
        #[source]
        source: OracleError,
    },

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// I/O error (configuration files).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON configuration error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration could not be parsed.
    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML configuration could not be written.
    #[error("toml write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

impl EngineError {
    pub(crate) fn oracle(block: impl Into<String>, source: OracleError) -> Self {
        EngineError::Oracle {
            block: block.into(),
            source,
        }
    }
}
