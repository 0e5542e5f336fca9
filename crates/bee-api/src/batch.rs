//! Postage batch records as reported by the Bee debug API

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque postage batch identifier (hex string issued by the chain).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BatchId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for BatchId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A prepaid storage allotment.
///
/// `batch_ttl` is in seconds and may be negative for batches the node has
/// already written off. `amount` stays a decimal string because balances
/// exceed `u64` on mainnet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostageBatch {
    #[serde(rename = "batchID")]
    pub batch_id: BatchId,
    pub utilization: u64,
    pub usable: bool,
    #[serde(default)]
    pub label: String,
    pub depth: u8,
    pub amount: String,
    pub bucket_depth: u8,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub immutable_flag: bool,
    #[serde(default)]
    pub exists: bool,
    #[serde(rename = "batchTTL")]
    pub batch_ttl: i64,
}

/// Envelope of `GET /stamps`.
#[derive(Debug, Deserialize)]
pub(crate) struct BatchList {
    #[serde(default)]
    pub stamps: Vec<PostageBatch>,
}

/// Envelope of `POST /stamps/..` and `PATCH /stamps/topup/..`.
#[derive(Debug, Deserialize)]
pub(crate) struct BatchIdResponse {
    #[serde(rename = "batchID")]
    pub batch_id: BatchId,
}
