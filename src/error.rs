//! Error types for clickstream-loadgen

use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Event generation error (fatal for one worker only)
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Pipeline orchestration error
    #[error("orchestration error: {0}")]
    Orchestration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// A numeric range whose lower bound is not below its upper bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid range: lower bound {lo} must be less than upper bound {hi}")]
pub struct RangeError {
    /// Offending lower bound
    pub lo: u32,
    /// Offending upper bound
    pub hi: u32,
}

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value the run cannot proceed with
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// A required builder field was never set
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// An interval bound pair could not form a range
    #[error(transparent)]
    Range(#[from] RangeError),

    /// An enum-valued setting could not be interpreted
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Errors raised while building or running an event generator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Application type string did not match any known variant
    #[error("unsupported application type: {0:?}")]
    UnsupportedAppKind(String),

    /// Platform string did not match any known variant
    #[error("unsupported platform: {0:?}")]
    UnsupportedPlatform(String),

    /// A product listing page was configured below the minimum size
    #[error("product page of {got} products is too small, need at least {min}")]
    ProductPageTooSmall {
        /// Configured page size
        got: u32,
        /// Smallest acceptable page size
        min: u32,
    },
}
