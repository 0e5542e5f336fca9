//! Service runtime bookkeeping
//!
//! Request counters shared by the handlers and the background jobs that
//! must be stopped on shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use postage_stamps::RefreshScheduler;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Drain timeout for in-flight requests once shutdown starts
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime metrics tracked while the service is running
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Requests currently being processed, reported when the drain times out.
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Mark a request as in flight until the returned guard drops.
    pub fn track(&self) -> InFlight {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlight(self.in_flight.clone())
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decrements the in-flight gauge on drop, including when the handler
/// future is dropped mid-request.
pub struct InFlight(Arc<AtomicU64>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Background refresh loops sharing one cancellation token.
pub struct BackgroundJobs {
    token: CancellationToken,
    schedulers: Vec<RefreshScheduler>,
}

impl BackgroundJobs {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            schedulers: Vec::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn push(&mut self, scheduler: Option<RefreshScheduler>) {
        self.schedulers.extend(scheduler);
    }

    pub fn count(&self) -> usize {
        self.schedulers.len()
    }

    /// Stop loops from starting new cycles, without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel every loop and wait for in-flight cycles to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for scheduler in self.schedulers {
            let name = scheduler.name();
            scheduler.shutdown().await;
            info!(job = name, "background job stopped");
        }
    }
}
