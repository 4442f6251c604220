use thiserror::Error;

/// Errors raised while fetching or decoding a route snapshot.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Network failure, connect/request timeout, or body read error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response decoded but did not have the expected structure.
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl FeedError {
    /// A structurally bad payload, as opposed to a transport failure.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FeedError::Malformed(_))
    }
}
