use thiserror::Error;

/// Typed failures surfaced by the audit / plan / synthesize engine and the
/// orchestration layer that applies plans.
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("invalid node path {path:?}: {reason}")]
    InvalidInput { path: String, reason: String },

    #[error("cannot plan a synthesis for an empty cluster")]
    EmptyCluster,

    #[error("archive destination {destination} claimed by both {first} and {second}")]
    Collision {
        destination: String,
        first: String,
        second: String,
    },

    #[error("plan is stale: source {path} changed or disappeared since preview")]
    StalePlan { path: String },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SubstrateError {
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SubstrateError>;
