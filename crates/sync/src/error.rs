//! Unified error handling for the synchronization components.
//!
//! Component operations return `Result<T, SyncError>`. Failures coming out of
//! the catalog source are shared behind an `Arc` because a coalesced fetch hands
//! the same failure to every caller waiting on it.

use std::sync::Arc;

use thiserror::Error;

use crate::source::SourceError;
use crate::store::StoreError;

/// Error type for catalog, ledger and hydration operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The catalog source could not be reached or answered with a failure.
    ///
    /// Pagination state is left untouched, so retrying is safe.
    #[error("Transport error: {0}")]
    Transport(Arc<SourceError>),

    /// The catalog source answered with a malformed response.
    ///
    /// Nothing from the response is committed.
    #[error("Data error: {0}")]
    Data(Arc<SourceError>),

    /// A page was requested before the cursor of the page preceding it was
    /// known.
    #[error(
        "Sequence gap: cursor for page {page} is unknown until page {} is loaded",
        .page.saturating_sub(1)
    )]
    SequenceGap { page: u32 },

    /// The requested page is outside the known extent of the catalog.
    #[error("Page {page} is out of range (last page: {last_page})")]
    PageOutOfRange { page: u32, last_page: u32 },

    /// The response arrived after the pagination it belonged to was reset.
    #[error("Response for page {page} was superseded")]
    Superseded { page: u32 },

    /// Reading or writing persisted state failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether this is a transport failure (safe to retry as-is).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<Arc<SourceError>> for SyncError {
    fn from(err: Arc<SourceError>) -> Self {
        if err.is_transport() {
            Self::Transport(err)
        } else {
            Self::Data(err)
        }
    }
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        Self::from(Arc::new(err))
    }
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;
