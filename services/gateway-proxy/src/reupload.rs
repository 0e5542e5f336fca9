//! Pinned content reupload job
//!
//! Pinned content stays on the gateway's node, but its chunks can fall out
//! of the network. Each cycle checks every pin and re-pushes the ones the
//! network can no longer serve.

use std::sync::Arc;
use std::time::Duration;

use bee_api::BeeClient;
use postage_stamps::RefreshScheduler;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::record_reupload;

/// What one reupload cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReuploadOutcome {
    pub checked: usize,
    pub reuploaded: usize,
    pub failures: usize,
}

pub struct ContentReuploader {
    node: BeeClient,
}

impl ContentReuploader {
    pub fn new(node: BeeClient) -> Self {
        Self { node }
    }

    /// Check every pin once.
    ///
    /// Fails only when the pin list cannot be fetched; per-reference
    /// failures are logged and counted in the outcome.
    pub async fn run(&self) -> bee_api::Result<ReuploadOutcome> {
        let pins = self.node.pins().await?;
        debug!(pins = pins.len(), "checking pinned content");

        let mut outcome = ReuploadOutcome::default();
        for reference in &pins {
            outcome.checked += 1;
            match self.node.is_retrievable(reference).await {
                Ok(true) => {}
                Ok(false) => match self.node.reupload(reference).await {
                    Ok(()) => {
                        info!(reference = %reference, "reuploaded pinned content");
                        record_reupload();
                        outcome.reuploaded += 1;
                    }
                    Err(e) => {
                        warn!(reference = %reference, error = %e, "failed to reupload pinned content");
                        outcome.failures += 1;
                    }
                },
                Err(e) => {
                    warn!(reference = %reference, error = %e, "failed to check pinned content");
                    outcome.failures += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Run the job every `period` until `token` is cancelled.
    pub fn start(self: Arc<Self>, period: Duration, token: CancellationToken) -> RefreshScheduler {
        RefreshScheduler::spawn("content-reupload", period, token, move || {
            let job = Arc::clone(&self);
            async move { job.run().await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct MockNode {
        pins: Vec<String>,
        lost: Vec<String>,
        /// References whose stewardship check answers 500
        broken: Vec<String>,
        reuploaded: Vec<String>,
    }

    type Shared = Arc<Mutex<MockNode>>;

    async fn start_mock_node(node: MockNode) -> (String, Shared) {
        let shared: Shared = Arc::new(Mutex::new(node));
        let app = axum::Router::new()
            .route(
                "/pins",
                get(|State(s): State<Shared>| async move {
                    let refs = s.lock().unwrap().pins.clone();
                    Json(serde_json::json!({ "references": refs }))
                }),
            )
            .route(
                "/stewardship/{reference}",
                get(
                    |State(s): State<Shared>, Path(reference): Path<String>| async move {
                        let node = s.lock().unwrap();
                        if node.broken.contains(&reference) {
                            return Err(StatusCode::INTERNAL_SERVER_ERROR);
                        }
                        let lost = node.lost.contains(&reference);
                        Ok(Json(serde_json::json!({ "isRetrievable": !lost })))
                    },
                )
                .put(
                    |State(s): State<Shared>, Path(reference): Path<String>| async move {
                        s.lock().unwrap().reuploaded.push(reference);
                        StatusCode::OK
                    },
                ),
            )
            .with_state(shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), shared)
    }

    fn reuploader(url: &str) -> ContentReuploader {
        ContentReuploader::new(BeeClient::new(reqwest::Client::new(), url))
    }

    #[tokio::test]
    async fn reuploads_only_lost_pins() {
        let (url, node) = start_mock_node(MockNode {
            pins: vec!["aa".into(), "bb".into(), "cc".into()],
            lost: vec!["bb".into()],
            ..Default::default()
        })
        .await;

        let outcome = reuploader(&url).run().await.unwrap();

        assert_eq!(
            outcome,
            ReuploadOutcome {
                checked: 3,
                reuploaded: 1,
                failures: 0
            }
        );
        assert_eq!(node.lock().unwrap().reuploaded, vec!["bb"]);
    }

    #[tokio::test]
    async fn failed_check_does_not_stop_other_pins() {
        let (url, node) = start_mock_node(MockNode {
            pins: vec!["aa".into(), "bb".into()],
            lost: vec!["bb".into()],
            broken: vec!["aa".into()],
            ..Default::default()
        })
        .await;

        let outcome = reuploader(&url).run().await.unwrap();

        assert_eq!(outcome.failures, 1);
        assert_eq!(outcome.reuploaded, 1);
        assert_eq!(node.lock().unwrap().reuploaded, vec!["bb"]);
    }

    #[tokio::test]
    async fn unreachable_node_fails_the_cycle() {
        let result = reuploader("http://127.0.0.1:9").run().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reuploads_are_counted() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let (url, _node) = start_mock_node(MockNode {
            pins: vec!["aa".into(), "bb".into()],
            lost: vec!["aa".into(), "bb".into()],
            ..Default::default()
        })
        .await;
        reuploader(&url).run().await.unwrap();

        assert!(handle.render().contains("content_reupload_count 2"));
    }

    #[tokio::test]
    async fn started_job_runs_and_stops() {
        let (url, node) = start_mock_node(MockNode {
            pins: vec!["aa".into()],
            lost: vec!["aa".into()],
            ..Default::default()
        })
        .await;

        let token = CancellationToken::new();
        let scheduler = Arc::new(reuploader(&url)).start(Duration::from_secs(3600), token);
        for _ in 0..100 {
            if !node.lock().unwrap().reuploaded.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        scheduler.shutdown().await;

        assert_eq!(node.lock().unwrap().reuploaded, vec!["aa"]);
    }
}
