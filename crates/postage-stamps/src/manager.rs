//! Stamp manager: snapshot ownership, refresh cycles and the request-path accessor
//!
//! The manager owns the only mutable state in stamp management: the ordered
//! candidate list. Refresh cycles build a new list off to the side and
//! publish it by swapping an `Arc`; readers clone the current `Arc` and never
//! observe a partially built list. The lock guards only that pointer swap and
//! is never held across I/O.

use std::sync::{Arc, PoisonError, RwLock};

use bee_api::{BatchId, PostageApi, PostageBatch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::extend::top_up;
use crate::metrics::{
    ACCESSOR_CALL_COUNT, ACCESSOR_ERROR_COUNT, PURCHASE_FAILURE_COUNT, REFRESH_CHECK_COUNT,
    REFRESH_FAILURE_COUNT, TOP_UP_FAILURE_COUNT, USABLE_COUNT_GAUGE, record_candidates,
};
use crate::mode::{AutobuyPolicy, AutoextendPolicy, ManagementMode};
use crate::purchase::buy;
use crate::scheduler::RefreshScheduler;
use crate::select::{needs_purchase, needs_top_up, select_autobuy, select_extend};

/// What one refresh cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Candidate count after the cycle.
    pub candidates: usize,
    pub purchased: Option<BatchId>,
    pub topped_up: Vec<BatchId>,
    /// Purchases and top-ups that failed without aborting the cycle.
    pub failures: usize,
}

/// Owner of the current stamp snapshot.
pub struct StampsManager {
    mode: ManagementMode,
    api: Arc<dyn PostageApi>,
    candidates: RwLock<Arc<Vec<PostageBatch>>>,
}

impl StampsManager {
    pub fn new(mode: ManagementMode, api: Arc<dyn PostageApi>) -> Self {
        info!(mode = mode.label(), "postage stamp manager initialized");
        Self {
            mode,
            api,
            candidates: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn mode(&self) -> &ManagementMode {
        &self.mode
    }

    /// The batch id to stamp the next upload with.
    ///
    /// Never blocks on I/O. Hardcoded mode always yields its fixed id; the
    /// managed modes yield the head of the latest snapshot (most-used batch
    /// for autobuy, soonest-expiring for autoextend).
    pub fn current_stamp(&self) -> Result<BatchId> {
        metrics::counter!(ACCESSOR_CALL_COUNT).increment(1);

        let found = match &self.mode {
            ManagementMode::Hardcoded(id) => {
                debug!(batch_id = %id, "using hardcoded stamp");
                Some(id.clone())
            }
            ManagementMode::Autobuy(_) | ManagementMode::Autoextend(_) => {
                let snapshot = self.candidates();
                snapshot.first().map(|batch| {
                    debug!(batch_id = %batch.batch_id, "using managed stamp");
                    batch.batch_id.clone()
                })
            }
            ManagementMode::Disabled => None,
        };

        found.ok_or_else(|| {
            metrics::counter!(ACCESSOR_ERROR_COUNT).increment(1);
            Error::NoUsableStamp
        })
    }

    /// Snapshot of the current candidate list.
    pub fn candidates(&self) -> Arc<Vec<PostageBatch>> {
        self.candidates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish `next` as the candidate list and return it.
    fn publish(&self, next: Vec<PostageBatch>) -> Arc<Vec<PostageBatch>> {
        let next = Arc::new(next);
        *self
            .candidates
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        next
    }

    /// Run one refresh cycle for the configured mode.
    ///
    /// Fails only when the batch list cannot be fetched, in which case the
    /// previous snapshot is kept untouched. Purchase and top-up failures are
    /// logged, counted and reported in the outcome instead.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        match &self.mode {
            ManagementMode::Autobuy(policy) => self.refresh_autobuy(policy).await,
            ManagementMode::Autoextend(policy) => self.refresh_extend(policy).await,
            ManagementMode::Disabled | ManagementMode::Hardcoded(_) => {
                Ok(RefreshOutcome::default())
            }
        }
    }

    /// Spawn the background refresh loop for managed modes.
    ///
    /// Returns `None` for disabled and hardcoded modes, which have nothing to
    /// refresh.
    pub fn start(self: &Arc<Self>, token: CancellationToken) -> Option<RefreshScheduler> {
        let period = self.mode.refresh_period()?;
        let manager = Arc::clone(self);
        Some(RefreshScheduler::spawn(
            "postage-stamps",
            period,
            token,
            move || {
                let manager = Arc::clone(&manager);
                async move {
                    let outcome = manager.refresh().await?;
                    debug!(
                        candidates = outcome.candidates,
                        purchased = outcome.purchased.is_some(),
                        topped_up = outcome.topped_up.len(),
                        failures = outcome.failures,
                        "postage stamp refresh finished"
                    );
                    Ok::<_, Error>(outcome)
                }
            },
        ))
    }

    async fn refresh_autobuy(&self, policy: &AutobuyPolicy) -> Result<RefreshOutcome> {
        let batches = self.fetch().await?;

        let selected = select_autobuy(
            batches,
            policy.batch.depth,
            &policy.batch.amount,
            policy.usage_max,
            policy.ttl_min,
        );
        let purchase_needed = needs_purchase(&selected, policy.usage_threshold);
        let snapshot = self.publish(selected);
        record_candidates(&snapshot);

        let mut outcome = RefreshOutcome {
            candidates: snapshot.len(),
            ..RefreshOutcome::default()
        };
        if !purchase_needed {
            return Ok(outcome);
        }

        match buy(self.api.as_ref(), &policy.batch).await {
            Ok(batch) => {
                outcome.purchased = Some(batch.batch_id.clone());
                let mut next = Vec::clone(&snapshot);
                next.push(batch);
                let snapshot = self.publish(next);
                metrics::gauge!(USABLE_COUNT_GAUGE).set(snapshot.len() as f64);
                outcome.candidates = snapshot.len();
            }
            Err(e) => {
                warn!(error = %e, "failed to buy postage batch, next cycle will retry");
                metrics::counter!(PURCHASE_FAILURE_COUNT).increment(1);
                outcome.failures += 1;
            }
        }
        Ok(outcome)
    }

    async fn refresh_extend(&self, policy: &AutoextendPolicy) -> Result<RefreshOutcome> {
        let batches = self.fetch().await?;

        let snapshot = self.publish(select_extend(batches));
        record_candidates(&snapshot);
        let mut outcome = RefreshOutcome {
            candidates: snapshot.len(),
            ..RefreshOutcome::default()
        };

        // Either buy or top up, never both in one cycle
        if snapshot.is_empty() {
            match buy(self.api.as_ref(), &policy.batch).await {
                Ok(batch) => {
                    outcome.purchased = Some(batch.batch_id.clone());
                    let snapshot = self.publish(vec![batch]);
                    record_candidates(&snapshot);
                    outcome.candidates = snapshot.len();
                }
                Err(e) => {
                    warn!(error = %e, "failed to buy postage batch, next cycle will retry");
                    metrics::counter!(PURCHASE_FAILURE_COUNT).increment(1);
                    outcome.failures += 1;
                }
            }
            return Ok(outcome);
        }

        let threshold = policy.top_up_threshold();
        let mut updated = Vec::new();
        for batch in snapshot.iter().filter(|b| needs_top_up(b, threshold)) {
            info!(batch_id = %batch.batch_id, ttl = batch.batch_ttl, "extending postage batch");
            match top_up(self.api.as_ref(), &batch.batch_id, &policy.batch.amount).await {
                Ok(record) => {
                    outcome.topped_up.push(record.batch_id.clone());
                    updated.push(record);
                }
                Err(e) => {
                    warn!(batch_id = %batch.batch_id, error = %e, "failed to top up postage batch");
                    metrics::counter!(TOP_UP_FAILURE_COUNT).increment(1);
                    outcome.failures += 1;
                }
            }
        }

        // Topped-up batches carry a new TTL, which may also change the order
        if !updated.is_empty() {
            let merged = snapshot
                .iter()
                .map(|b| {
                    updated
                        .iter()
                        .find(|u| u.batch_id == b.batch_id)
                        .unwrap_or(b)
                        .clone()
                })
                .collect();
            let snapshot = self.publish(select_extend(merged));
            record_candidates(&snapshot);
            outcome.candidates = snapshot.len();
        }
        Ok(outcome)
    }

    /// List the node's batches, counting the attempt and any failure.
    async fn fetch(&self) -> Result<Vec<PostageBatch>> {
        metrics::counter!(REFRESH_CHECK_COUNT).increment(1);
        info!(mode = self.mode.label(), "checking postage stamps");

        match self.api.list_batches().await {
            Ok(batches) => {
                debug!(batches = batches.len(), "retrieved postage batches");
                Ok(batches)
            }
            Err(e) => {
                metrics::counter!(REFRESH_FAILURE_COUNT).increment(1);
                Err(Error::UpstreamFetch(e.to_string()))
            }
        }
    }
}
