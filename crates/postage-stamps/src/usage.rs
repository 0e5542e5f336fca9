//! Batch usage ratio

use bee_api::PostageBatch;

/// Fraction of a batch's fullest bucket that has been written:
/// `utilization / 2^(depth - bucket_depth)`.
///
/// A well-formed batch lands in [0, 1]. `depth < bucket_depth` can only come
/// from an inconsistent node and reports `f64::INFINITY`, which every
/// selector treats as exhausted.
pub fn usage(batch: &PostageBatch) -> f64 {
    if batch.depth < batch.bucket_depth {
        return f64::INFINITY;
    }
    let slots = 2f64.powi(i32::from(batch.depth - batch.bucket_depth));
    batch.utilization as f64 / slots
}
