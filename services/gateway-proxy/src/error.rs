//! Per-request proxy errors
//!
//! Each variant maps to one HTTP status and a stable `type` string in the
//! JSON error body. Startup errors go through `anyhow` in `main` instead.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("missing or invalid authorization")]
    Forbidden,

    #[error("no such endpoint")]
    NotFound,

    #[error("no usable postage stamp available, try again later")]
    NoStamp,

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("upstream timeout after {secs}s ({attempts} attempts)")]
    UpstreamTimeout { secs: u64, attempts: u32 },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("response build error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::NoStamp => StatusCode::SERVICE_UNAVAILABLE,
            Error::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Value of the `type` field in the error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Forbidden => "forbidden",
            Error::NotFound => "not_found",
            Error::NoStamp => "no_stamp",
            Error::BodyTooLarge { .. } => "payload_too_large",
            Error::InvalidBody(_) => "invalid_request",
            Error::UpstreamTimeout { .. } | Error::Upstream(_) | Error::Internal(_) => {
                "proxy_error"
            }
        }
    }

    /// Whether the failure counts toward `errors_total`.
    ///
    /// Client mistakes (bad credentials, unknown routes) do not.
    pub fn is_gateway_failure(&self) -> bool {
        !matches!(self, Error::Forbidden | Error::NotFound)
    }
}
