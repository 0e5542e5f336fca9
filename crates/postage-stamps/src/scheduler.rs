//! Periodic background job runner
//!
//! Runs a job immediately, then again `period` after each run *finishes*.
//! Runs never overlap: the next sleep is armed only once the current run has
//! returned, whether it succeeded, failed or panicked. Errors and panics are
//! logged at the loop boundary and never end the loop; only the cancellation
//! token does, and only between runs.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handle to a spawned refresh loop.
pub struct RefreshScheduler {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Spawn `job` on the current tokio runtime.
    ///
    /// Cancelling `token` (or calling `shutdown`) stops the loop after the
    /// in-flight run, if any, completes.
    pub fn spawn<F, Fut, T, E>(
        name: &'static str,
        period: Duration,
        token: CancellationToken,
        mut job: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            info!(job = name, period_secs = period.as_secs(), "refresh loop started");
            while !loop_token.is_cancelled() {
                run_once(name, &mut job).await;

                tokio::select! {
                    () = tokio::time::sleep(period) => {}
                    () = loop_token.cancelled() => break,
                }
            }
            info!(job = name, "refresh loop stopped");
        });

        Self {
            name,
            token,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request the loop to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the loop and wait for the in-flight run to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!(job = self.name, error = %e, "refresh loop task failed");
        }
    }
}

async fn run_once<F, Fut, T, E>(name: &'static str, job: &mut F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match AssertUnwindSafe(async { job().await }).catch_unwind().await {
        Ok(Ok(_)) => debug!(job = name, "refresh cycle completed"),
        Ok(Err(e)) => warn!(job = name, error = %e, "refresh cycle failed, will retry next period"),
        Err(panic) => error!(
            job = name,
            panic = panic_message(panic.as_ref()),
            "refresh cycle panicked, loop continues"
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
