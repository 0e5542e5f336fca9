//! Candidate selection per management mode
//!
//! Both selectors are pure and use stable sorts, so batches with equal keys
//! keep the node's listing order.

use std::time::Duration;

use bee_api::PostageBatch;

use crate::usage::usage;

/// Autobuy pool: usable batches of the managed depth/amount that are below
/// `max_usage` and outlive `min_ttl`, most-used first.
///
/// Draining the most-used batch first keeps lightly used batches in reserve.
pub fn select_autobuy(
    batches: Vec<PostageBatch>,
    depth: u8,
    amount: &str,
    max_usage: f64,
    min_ttl: Duration,
) -> Vec<PostageBatch> {
    let min_ttl = ttl_secs(min_ttl);
    let mut selected: Vec<PostageBatch> = batches
        .into_iter()
        .filter(|b| {
            b.usable
                && b.depth == depth
                && b.amount == amount
                && usage(b) < max_usage
                && b.batch_ttl > min_ttl
        })
        .collect();
    selected.sort_by(|a, b| usage(b).total_cmp(&usage(a)));
    selected
}

/// Autoextend pool: every usable batch, soonest to expire first.
pub fn select_extend(batches: Vec<PostageBatch>) -> Vec<PostageBatch> {
    let mut selected: Vec<PostageBatch> = batches.into_iter().filter(|b| b.usable).collect();
    selected.sort_by_key(|b| b.batch_ttl);
    selected
}

/// Whether an autobuy pool (as ordered by `select_autobuy`) needs a new batch.
///
/// True when the pool is empty, or when even its least-used batch (the tail)
/// has reached `usage_threshold`.
pub fn needs_purchase(candidates: &[PostageBatch], usage_threshold: f64) -> bool {
    match candidates.last() {
        None => true,
        Some(least_used) => usage(least_used) >= usage_threshold,
    }
}

/// Whether a batch expires before `threshold` (seconds) and must be topped up.
pub fn needs_top_up(batch: &PostageBatch, threshold: Duration) -> bool {
    batch.batch_ttl < ttl_secs(threshold)
}

fn ttl_secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}
