//! Postage stamp lifecycle management for the Swarm gateway
//!
//! Keeps at least one postage batch usable, unexpired and under its usage
//! ceiling, and hands the current batch id to request handlers without any
//! I/O on the request path.
//!
//! Batch lifecycle under management:
//! 1. `RefreshScheduler` runs the manager's refresh cycle every period
//! 2. The cycle lists the node's batches and narrows them with a selector
//!    (`select_autobuy` or `select_extend`, depending on the mode)
//! 3. The selected list replaces the manager's snapshot in a single swap
//! 4. Autobuy buys a fresh batch when the pool is empty or its least-used
//!    batch crosses the usage threshold
//! 5. Autoextend tops up every batch whose TTL would run out before the
//!    next cycle, or buys one when none is usable
//! 6. Request handlers call `StampsManager::current_stamp()` against the
//!    latest snapshot

pub mod error;
pub mod extend;
pub mod manager;
pub mod metrics;
pub mod mode;
pub mod purchase;
pub mod scheduler;
pub mod select;
pub mod usage;

pub use error::{Error, Result};
pub use extend::top_up;
pub use manager::{RefreshOutcome, StampsManager};
pub use mode::{AutobuyPolicy, AutoextendPolicy, BatchSpec, ManagementMode};
pub use purchase::buy;
pub use scheduler::RefreshScheduler;
pub use select::{needs_purchase, needs_top_up, select_autobuy, select_extend};
pub use usage::usage;
