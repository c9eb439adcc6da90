//! Error taxonomy for the rightsizing engine
//!
//! Input errors fail a single recommendation and name the offending field.
//! Dependency errors (catalog, cost quoting) are propagated as hard failures.
//! Explanation failures stop at the engine, which logs and swallows them.

use thiserror::Error;

/// Errors produced by the rightsizing engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A preference value could not be interpreted
    #[error("invalid preference {key}: {reason}")]
    InvalidPreference { key: String, reason: String },

    /// The request itself is malformed (bad quantity, missing field, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The current resource type does not exist in the catalog
    #[error("unknown {kind} type {id}")]
    UnknownResourceType { kind: String, id: String },

    /// The catalog could not be read
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The cost quoting service failed
    #[error("cost quote failed: {0}")]
    CostQuote(String),

    /// No GCP disk tier can serve the needed IOPS/throughput
    #[error("no feasible disk type for machine {machine_type} at {size_gb} GB")]
    NoFeasibleDiskType { machine_type: String, size_gb: f64 },

    /// Trimmed mean over an empty sample set
    #[error("cannot compute a trimmed mean of an empty sample set")]
    EmptySamples,

    /// The explanation service failed; callers swallow this
    #[error("explanation failed: {0}")]
    Explanation(String),

    /// A delegated call exceeded its deadline
    #[error("{0} timed out")]
    Timeout(String),
}

impl EngineError {
    pub fn invalid_preference(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPreference {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Errors caused by the caller's request
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidPreference { .. }
                | EngineError::InvalidInput(_)
                | EngineError::UnknownResourceType { .. }
                | EngineError::EmptySamples
        )
    }

    /// Errors caused by an external collaborator
    pub fn is_dependency(&self) -> bool {
        matches!(
            self,
            EngineError::CatalogUnavailable(_)
                | EngineError::CostQuote(_)
                | EngineError::Explanation(_)
                | EngineError::Timeout(_)
        )
    }
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
