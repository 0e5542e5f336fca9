//! Error types for Bee API calls

/// Errors from Bee API calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("bee returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid bee response: {0}")]
    Decode(String),

    #[error("batch {batch_id} not usable after {waited_secs}s")]
    UsableTimeout { batch_id: String, waited_secs: u64 },
}

impl Error {
    /// HTTP status reported by the node, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for Bee API calls.
pub type Result<T> = std::result::Result<T, Error>;
