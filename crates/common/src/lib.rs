//! Types shared by the Swarm gateway crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
