//! Topping up existing postage batches

use bee_api::{BatchId, PostageApi, PostageBatch};
use tracing::info;

use crate::error::{Error, Result};
use crate::metrics::TOP_UP_COUNT;

/// Add `amount` per-chunk balance to batch `id` and return its updated record.
pub async fn top_up(api: &dyn PostageApi, id: &BatchId, amount: &str) -> Result<PostageBatch> {
    let failed = |e: bee_api::Error| Error::ExtendFailed {
        batch_id: id.clone(),
        message: e.to_string(),
    };

    api.top_up_batch(id, amount).await.map_err(failed)?;
    metrics::counter!(TOP_UP_COUNT).increment(1);

    let batch = api.get_batch(id).await.map_err(failed)?;
    info!(batch_id = %id, amount, ttl = batch.batch_ttl, "topped up postage batch");
    Ok(batch)
}
