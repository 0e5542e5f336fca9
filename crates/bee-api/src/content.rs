//! Bee public API client for pin stewardship
//!
//! Used by the gateway's content reupload job: list locally pinned
//! references, ask the node whether each is still retrievable from the
//! network, and re-push the ones that are not.

use serde::Deserialize;

use crate::error::Result;
use crate::transport::{check, decode, request_failed};

#[derive(Debug, Deserialize)]
struct PinList {
    #[serde(default)]
    references: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Stewardship {
    is_retrievable: bool,
}

/// Client for the Bee public API.
#[derive(Debug, Clone)]
pub struct BeeClient {
    client: reqwest::Client,
    base_url: String,
}

impl BeeClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// References pinned on the node (`GET /pins`).
    pub async fn pins(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url("/pins"))
            .send()
            .await
            .map_err(request_failed)?;
        let list: PinList = decode(check(response).await?).await?;
        Ok(list.references)
    }

    /// Whether every chunk of `reference` can still be fetched from the network.
    pub async fn is_retrievable(&self, reference: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&format!("/stewardship/{reference}")))
            .send()
            .await
            .map_err(request_failed)?;
        let stewardship: Stewardship = decode(check(response).await?).await?;
        Ok(stewardship.is_retrievable)
    }

    /// Re-push the locally pinned `reference` to the network.
    pub async fn reupload(&self, reference: &str) -> Result<()> {
        let response = self
            .client
            .put(self.url(&format!("/stewardship/{reference}")))
            .send()
            .await
            .map_err(request_failed)?;
        check(response).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
