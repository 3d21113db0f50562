//! Error type shared by the query pipeline and configuration.

pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors are `Clone` so one failed in-flight query can be handed to every
/// subscriber waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("backend query failed: {0}")]
    BackendQueryFailed(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        AgentError::BackendQueryFailed(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        use std::error::Error as _;
        let cause = err
            .source()
            .map(|c| format!(" (cause: {c})"))
            .unwrap_or_default();
        AgentError::BackendQueryFailed(format!("{err}{cause}"))
    }
}
