//! Prometheus metrics exposition
//!
//! Gateway metrics:
//!
//! - `gateway_requests_total` (counter): labels `status`, `method`
//! - `gateway_request_duration_seconds` (histogram): label `status`
//! - `gateway_upstream_errors_total` (counter): label `error_type`
//! - `content_reupload_count` (counter)
//!
//! The stamp manager's own counters and gauges are registered by
//! `postage_stamps::metrics::describe` and render through the same recorder.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
pub const UPSTREAM_ERRORS_TOTAL: &str = "gateway_upstream_errors_total";
pub const CONTENT_REUPLOAD_COUNT: &str = "content_reupload_count";

/// Bucket boundaries from 5ms to 60s, matching the proxy's timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `gateway_request_duration_seconds` renders as a histogram (with `_bucket`
/// lines) rather than the default summary.
pub fn install_recorder() -> PrometheusHandle {
    let handle = builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    describe();
    handle
}

/// Register help text for gateway and stamp manager metrics.
pub fn describe() {
    metrics::describe_counter!(REQUESTS_TOTAL, "Proxied requests by status and method");
    metrics::describe_histogram!(
        REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Proxied request latency"
    );
    metrics::describe_counter!(
        UPSTREAM_ERRORS_TOTAL,
        "Failed calls to the Bee API by error type"
    );
    metrics::describe_counter!(
        CONTENT_REUPLOAD_COUNT,
        "How many pinned references were reuploaded"
    );
    postage_stamps::metrics::describe();
}

/// Record a completed proxy request with status code and HTTP method labels.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(REQUESTS_TOTAL, "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "status" => status_str).record(duration_secs);
}

/// Record an upstream error with a classification label.
pub fn record_upstream_error(error_type: &'static str) {
    metrics::counter!(UPSTREAM_ERRORS_TOTAL, "error_type" => error_type).increment(1);
}

pub fn record_reupload() {
    metrics::counter!(CONTENT_REUPLOAD_COUNT).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    /// Isolated recorder/handle pair: only one global recorder may exist per
    /// process, so tests use a thread-local one instead.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request(200, "GET", 0.05);
        record_upstream_error("timeout");
        record_reupload();
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(201, "POST", 0.042);
        record_request(404, "GET", 0.001);

        let output = handle.render();
        assert!(output.contains("gateway_requests_total"));
        assert!(output.contains("status=\"201\""));
        assert!(output.contains("method=\"POST\""));
        assert!(output.contains("status=\"404\""));
        assert!(
            output.contains("gateway_request_duration_seconds_bucket"),
            "histogram must render _bucket lines for histogram_quantile() queries"
        );
        assert!(output.contains("le=\"0.005\""));
        assert!(output.contains("le=\"60\""));
    }

    #[test]
    fn record_upstream_error_carries_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_upstream_error("timeout");
        record_upstream_error("connection");

        let output = handle.render();
        assert!(output.contains("gateway_upstream_errors_total"));
        assert!(output.contains("error_type=\"timeout\""));
        assert!(output.contains("error_type=\"connection\""));
    }

    #[test]
    fn describe_registers_stamp_metrics_help() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        describe();
        record_reupload();
        metrics::counter!(postage_stamps::metrics::PURCHASE_COUNT).increment(1);

        let output = handle.render();
        assert!(output.contains("content_reupload_count 1"), "{output}");
        assert!(
            output.contains("# HELP purchase_count How many postage batches were purchased"),
            "{output}"
        );
    }
}
