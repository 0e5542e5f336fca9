//! Readiness probe
//!
//! A gateway with stamp management is ready only when it can stamp an
//! upload and the node answers its health check.

use std::time::Duration;

use axum::http::StatusCode;
use bee_api::BeeDebugClient;
use postage_stamps::StampsManager;
use tracing::{error, warn};

/// Upper bound on the node health check.
const READINESS_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessStatus {
    Ok,
    NoStamp,
    HealthCheckFailed,
    OtherError,
}

impl ReadinessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadinessStatus::Ok => "OK",
            ReadinessStatus::NoStamp => "NO_STAMP",
            ReadinessStatus::HealthCheckFailed => "HEALTH_CHECK_FAILED",
            ReadinessStatus::OtherError => "OTHER_ERROR",
        }
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            ReadinessStatus::Ok => StatusCode::OK,
            ReadinessStatus::NoStamp => StatusCode::SERVICE_UNAVAILABLE,
            ReadinessStatus::HealthCheckFailed | ReadinessStatus::OtherError => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

/// Check whether the gateway can serve traffic.
pub async fn check_readiness(stamps: &StampsManager, node: &BeeDebugClient) -> ReadinessStatus {
    if stamps.mode().is_enabled() {
        if let Err(e) = stamps.current_stamp() {
            warn!(error = %e, "not ready: no usable postage stamp");
            return ReadinessStatus::NoStamp;
        }
    }

    match tokio::time::timeout(READINESS_TIMEOUT, node.health()).await {
        Ok(Ok(health)) if health.is_ok() => ReadinessStatus::Ok,
        Ok(Ok(health)) => {
            warn!(status = %health.status, "bee node health check failed");
            ReadinessStatus::HealthCheckFailed
        }
        Ok(Err(e)) => {
            error!(error = %e, "unable to reach bee node for readiness");
            ReadinessStatus::OtherError
        }
        Err(_) => {
            error!(
                timeout_secs = READINESS_TIMEOUT.as_secs(),
                "bee node health check timed out"
            );
            ReadinessStatus::OtherError
        }
    }
}
