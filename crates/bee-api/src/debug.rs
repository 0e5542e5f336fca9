//! Bee debug API client
//!
//! Covers the postage batch endpoints and the node health probe:
//! - `GET /stamps`, `GET /stamps/{id}`
//! - `POST /stamps/{amount}/{depth}`
//! - `PATCH /stamps/topup/{id}/{amount}`
//! - `GET /health`
//!
//! Request timeouts come from the `reqwest::Client` the caller builds, so a
//! hung node cannot stall the stamp refresh loop past that bound.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::api::{ApiFuture, PostageApi};
use crate::batch::{BatchId, BatchIdResponse, BatchList, PostageBatch};
use crate::error::{Error, Result};
use crate::transport::{check, decode, request_failed};

/// Poll interval while waiting for a fresh batch to become usable.
const DEFAULT_USABLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on waiting for a fresh batch to become usable.
const DEFAULT_USABLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Body of `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeHealth {
    pub status: String,
    #[serde(default)]
    pub version: String,
}

impl NodeHealth {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Client for the Bee debug API.
#[derive(Debug, Clone)]
pub struct BeeDebugClient {
    client: reqwest::Client,
    base_url: String,
    usable_poll_interval: Duration,
    usable_timeout: Duration,
}

impl BeeDebugClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            usable_poll_interval: DEFAULT_USABLE_POLL_INTERVAL,
            usable_timeout: DEFAULT_USABLE_TIMEOUT,
        }
    }

    /// Override how a purchase waits for its batch to become usable.
    pub fn with_usable_wait(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.usable_poll_interval = poll_interval;
        self.usable_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Node health probe.
    pub async fn health(&self) -> Result<NodeHealth> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(request_failed)?;
        decode(check(response).await?).await
    }

    pub async fn batches(&self) -> Result<Vec<PostageBatch>> {
        let response = self
            .client
            .get(self.url("/stamps"))
            .send()
            .await
            .map_err(request_failed)?;
        let list: BatchList = decode(check(response).await?).await?;
        Ok(list.stamps)
    }

    pub async fn batch(&self, id: &BatchId) -> Result<PostageBatch> {
        let response = self
            .client
            .get(self.url(&format!("/stamps/{id}")))
            .send()
            .await
            .map_err(request_failed)?;
        decode(check(response).await?).await
    }

    /// Buy a batch of `depth` with `amount` per chunk.
    pub async fn buy_batch(
        &self,
        amount: &str,
        depth: u8,
        wait_until_usable: bool,
    ) -> Result<BatchId> {
        let response = self
            .client
            .post(self.url(&format!("/stamps/{amount}/{depth}")))
            .send()
            .await
            .map_err(request_failed)?;
        let created: BatchIdResponse = decode(check(response).await?).await?;
        info!(batch_id = %created.batch_id, depth, amount, "postage batch created");

        if wait_until_usable {
            self.wait_until_usable(&created.batch_id).await?;
        }
        Ok(created.batch_id)
    }

    pub async fn top_up(&self, id: &BatchId, amount: &str) -> Result<()> {
        let response = self
            .client
            .patch(self.url(&format!("/stamps/topup/{id}/{amount}")))
            .send()
            .await
            .map_err(request_failed)?;
        check(response).await?;
        Ok(())
    }

    /// Poll the batch until the node flags it usable.
    ///
    /// A 404 means the node has not seen the purchase transaction yet and is
    /// polled again; any other error ends the wait.
    async fn wait_until_usable(&self, id: &BatchId) -> Result<()> {
        let poll = async {
            loop {
                match self.batch(id).await {
                    Ok(batch) if batch.usable => return Ok(()),
                    Ok(_) => debug!(batch_id = %id, "batch not usable yet"),
                    Err(Error::Status { status: 404, .. }) => {
                        debug!(batch_id = %id, "batch not visible on node yet")
                    }
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(self.usable_poll_interval).await;
            }
        };

        match tokio::time::timeout(self.usable_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(Error::UsableTimeout {
                batch_id: id.to_string(),
                waited_secs: self.usable_timeout.as_secs(),
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl PostageApi for BeeDebugClient {
    fn list_batches(&self) -> ApiFuture<'_, Vec<PostageBatch>> {
        Box::pin(self.batches())
    }

    fn get_batch<'a>(&'a self, id: &'a BatchId) -> ApiFuture<'a, PostageBatch> {
        Box::pin(self.batch(id))
    }

    fn create_batch<'a>(
        &'a self,
        amount: &'a str,
        depth: u8,
        wait_until_usable: bool,
    ) -> ApiFuture<'a, BatchId> {
        Box::pin(self.buy_batch(amount, depth, wait_until_usable))
    }

    fn top_up_batch<'a>(&'a self, id: &'a BatchId, amount: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(self.top_up(id, amount))
    }
}
