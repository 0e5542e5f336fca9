//! Postage batch management seam
//!
//! The stamp manager only needs four calls from the node. Keeping them behind
//! a trait lets the manager run against `BeeDebugClient` in production and an
//! in-memory fake in tests.

use std::future::Future;
use std::pin::Pin;

use crate::batch::{BatchId, PostageBatch};
use crate::error::Result;

/// Boxed future returned by `PostageApi` methods.
///
/// `Pin<Box<dyn Future>>` keeps the trait dyn-compatible (`Arc<dyn PostageApi>`).
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Upstream operations on postage batches.
pub trait PostageApi: Send + Sync {
    /// All batches owned by the node.
    fn list_batches(&self) -> ApiFuture<'_, Vec<PostageBatch>>;

    /// A single batch by id.
    fn get_batch<'a>(&'a self, id: &'a BatchId) -> ApiFuture<'a, PostageBatch>;

    /// Buy a new batch. With `wait_until_usable`, resolves only once the node
    /// reports the batch usable.
    fn create_batch<'a>(
        &'a self,
        amount: &'a str,
        depth: u8,
        wait_until_usable: bool,
    ) -> ApiFuture<'a, BatchId>;

    /// Add `amount` per-chunk balance to an existing batch.
    fn top_up_batch<'a>(&'a self, id: &'a BatchId, amount: &'a str) -> ApiFuture<'a, ()>;
}
