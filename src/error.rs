use thiserror::Error;

/// Classified page-fetch failures. Only `NotFound` is terminal per item;
/// the rest are transient and eligible for retry with backoff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("item not found (404)")]
    NotFound,
    #[error("page load timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("page failed to render: {0}")]
    Render(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::NotFound)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The expected structural anchors are entirely absent. Distinct from
    /// "item exists but has zero measurements", which is an empty result.
    #[error("page structure unrecognized: {0}")]
    MalformedPage(String),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Neither the primary checkpoint nor its backup could be read. Fatal:
    /// silently restarting from scratch risks duplicate or lost work.
    #[error("checkpoint corrupt and no usable backup: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
