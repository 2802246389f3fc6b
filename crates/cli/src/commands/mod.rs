//! Command implementations.

pub mod cart;
pub mod catalog;

use shop_sync::{ConnectError, SyncError};
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The state store or catalog client could not be set up.
    #[error("{0}")]
    Connect(#[from] ConnectError),

    /// A catalog or cart operation failed.
    #[error("{0}")]
    Sync(#[from] SyncError),
}
