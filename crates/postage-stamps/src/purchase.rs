//! Buying new postage batches

use bee_api::{PostageApi, PostageBatch};
use tracing::info;

use crate::error::{Error, Result};
use crate::metrics::PURCHASE_COUNT;
use crate::mode::BatchSpec;

/// Buy a batch shaped like `spec`, wait until the node reports it usable,
/// and return the node's full record of it.
///
/// The caller decides what a failure means for its cycle; nothing is retried
/// here.
pub async fn buy(api: &dyn PostageApi, spec: &BatchSpec) -> Result<PostageBatch> {
    info!(depth = spec.depth, amount = %spec.amount, "buying new postage batch");

    let id = api
        .create_batch(&spec.amount, spec.depth, true)
        .await
        .map_err(|e| Error::PurchaseFailed(e.to_string()))?;
    metrics::counter!(PURCHASE_COUNT).increment(1);

    let batch = api.get_batch(&id).await.map_err(|e| {
        Error::PurchaseFailed(format!("batch {id} created but could not be fetched: {e}"))
    })?;
    info!(batch_id = %batch.batch_id, ttl = batch.batch_ttl, "bought new postage batch");

    Ok(batch)
}
