//! Typed error kinds that cross crate boundaries.
//!
//! Runner and connector code wraps these in `anyhow` with context; the HTTP
//! surface maps them onto `{error: {kind, message}}` bodies.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fewer candles than the feature engineer's minimum window.
    #[error("insufficient data: have {have} candles, need {need}")]
    InsufficientData { have: usize, need: usize },

    /// Model artifact feature list disagrees with the 74-slot schema.
    #[error("feature schema mismatch: {0}")]
    FeatureSchemaMismatch(String),

    /// Inference requested before an artifact was attached.
    #[error("model not loaded")]
    ModelNotLoaded,

    /// Broker data could not be obtained after exhausting retries.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Token refresh failed; the operator must re-authenticate.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Metrics repository rejected a read or write.
    #[error("repository error: {0}")]
    Repository(String),
}

impl EngineError {
    /// Stable kind tag for the HTTP error envelope and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "InsufficientData",
            Self::FeatureSchemaMismatch(_) => "FeatureSchemaMismatch",
            Self::ModelNotLoaded => "ModelNotLoaded",
            Self::DataUnavailable(_) => "DataUnavailable",
            Self::AuthFailed(_) => "AuthFailed",
            Self::Repository(_) => "RepositoryError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        let e = EngineError::InsufficientData { have: 199, need: 200 };
        assert_eq!(e.kind(), "InsufficientData");
        assert!(e.to_string().contains("199"));
        assert_eq!(EngineError::ModelNotLoaded.kind(), "ModelNotLoaded");
    }
}
