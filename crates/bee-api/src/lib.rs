//! Client library for the Bee node HTTP APIs
//!
//! Two clients, matching the two listeners a Bee node exposes:
//! - `BeeDebugClient` talks to the debug API and manages postage batches
//!   (list, inspect, buy, top up) plus the node health probe.
//! - `BeeClient` talks to the public API for pin stewardship (used by the
//!   gateway's content reupload job).
//!
//! Postage batch management is also exposed through the `PostageApi` trait so
//! the stamp manager can be driven by an in-memory fake in tests.

pub mod api;
pub mod batch;
pub mod content;
pub mod debug;
pub mod error;
mod transport;

pub use api::{ApiFuture, PostageApi};
pub use batch::{BatchId, PostageBatch};
pub use content::BeeClient;
pub use debug::{BeeDebugClient, NodeHealth};
pub use error::{Error, Result};
