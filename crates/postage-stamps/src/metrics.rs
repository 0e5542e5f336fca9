//! Stamp manager metric names
//!
//! Emitted through the `metrics` facade; the gateway binary installs the
//! Prometheus recorder that renders them.

use bee_api::PostageBatch;

use crate::usage::usage;

pub const PURCHASE_COUNT: &str = "purchase_count";
pub const PURCHASE_FAILURE_COUNT: &str = "purchase_failure_count";
pub const REFRESH_CHECK_COUNT: &str = "refresh_check_count";
pub const REFRESH_FAILURE_COUNT: &str = "refresh_failure_count";
pub const ACCESSOR_CALL_COUNT: &str = "accessor_call_count";
pub const ACCESSOR_ERROR_COUNT: &str = "accessor_error_count";
pub const TOP_UP_COUNT: &str = "top_up_count";
pub const TOP_UP_FAILURE_COUNT: &str = "top_up_failure_count";
pub const CURRENT_TTL_GAUGE: &str = "current_ttl_gauge";
pub const CURRENT_USAGE_GAUGE: &str = "current_usage_gauge";
pub const USABLE_COUNT_GAUGE: &str = "usable_count_gauge";

/// Register help text with whichever recorder is installed.
pub fn describe() {
    metrics::describe_counter!(PURCHASE_COUNT, "How many postage batches were purchased");
    metrics::describe_counter!(
        PURCHASE_FAILURE_COUNT,
        "How many postage batch purchases failed"
    );
    metrics::describe_counter!(
        REFRESH_CHECK_COUNT,
        "How many times postage batches were retrieved from the node"
    );
    metrics::describe_counter!(
        REFRESH_FAILURE_COUNT,
        "How many times retrieving postage batches from the node failed"
    );
    metrics::describe_counter!(
        ACCESSOR_CALL_COUNT,
        "How many times the current postage stamp was requested"
    );
    metrics::describe_counter!(
        ACCESSOR_ERROR_COUNT,
        "How many times the current postage stamp was requested and none was usable"
    );
    metrics::describe_counter!(TOP_UP_COUNT, "How many postage batch top-ups succeeded");
    metrics::describe_counter!(TOP_UP_FAILURE_COUNT, "How many postage batch top-ups failed");
    metrics::describe_gauge!(CURRENT_TTL_GAUGE, "TTL in seconds of the selected postage batch");
    metrics::describe_gauge!(CURRENT_USAGE_GAUGE, "Usage of the selected postage batch");
    metrics::describe_gauge!(
        USABLE_COUNT_GAUGE,
        "How many postage batches on the node can be used"
    );
}

/// Publish the TTL/usage of the head candidate and the candidate count.
/// An empty list reports zeros.
pub(crate) fn record_candidates(candidates: &[PostageBatch]) {
    let head = candidates.first();
    metrics::gauge!(CURRENT_TTL_GAUGE).set(head.map_or(0.0, |b| b.batch_ttl as f64));
    metrics::gauge!(CURRENT_USAGE_GAUGE).set(head.map_or(0.0, usage));
    metrics::gauge!(USABLE_COUNT_GAUGE).set(candidates.len() as f64);
}
