//! Error types for stamp management

use bee_api::BatchId;

/// Errors from stamp management.
///
/// Only `Configuration` is fatal, and only at startup. The upstream variants
/// are caught at the refresh cycle boundary; `NoUsableStamp` goes back to the
/// request handler, which answers 503.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to fetch postage batches: {0}")]
    UpstreamFetch(String),

    #[error("postage batch purchase failed: {0}")]
    PurchaseFailed(String),

    #[error("top-up of postage batch {batch_id} failed: {message}")]
    ExtendFailed { batch_id: BatchId, message: String },

    #[error("no usable postage stamp")]
    NoUsableStamp,
}

/// Result alias for stamp management.
pub type Result<T> = std::result::Result<T, Error>;
