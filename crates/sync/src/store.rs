//! Durable key-value storage for client state.
//!
//! State is partitioned into independent [`Namespace`]s: writing the cart
//! ledger never touches (or locks) the pagination metadata and vice versa.
//! Within a namespace the last writer wins.
//!
//! The trait is synchronous. Components persist from inside the state
//! transition that produced the snapshot, never across an `.await`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by a [`StateStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The in-memory state could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Independent partitions of persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// `(productId, quantity)` pairs.
    CartLedger,
    /// Page counters and opportunistically cached page bodies.
    PaginationMetadata,
}

impl Namespace {
    /// Storage key of the namespace.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::CartLedger => "cart-ledger",
            Self::PaginationMetadata => "pagination-metadata",
        }
    }
}

/// A durable key-value record per namespace.
pub trait StateStore: Send + Sync {
    /// Read the raw document stored under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be read.
    fn load(&self, namespace: Namespace) -> Result<Option<String>, StoreError>;

    /// Replace the document stored under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be written.
    fn save(&self, namespace: Namespace, document: &str) -> Result<(), StoreError>;

    /// Delete the document stored under `namespace`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be written.
    fn remove(&self, namespace: Namespace) -> Result<(), StoreError>;
}

// =============================================================================
// Envelope
// =============================================================================

/// Wrapper written around every persisted payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    saved_at: DateTime<Utc>,
    state: T,
}

/// Serialize `state` and write it under `namespace`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_json<T: Serialize>(
    store: &dyn StateStore,
    namespace: Namespace,
    state: &T,
) -> Result<(), StoreError> {
    let document = serde_json::to_string(&Envelope {
        saved_at: Utc::now(),
        state,
    })?;
    store.save(namespace, &document)
}

/// Read and decode the payload stored under `namespace`.
///
/// Persisted state is always safe to drop, so an unreadable or corrupt
/// document is logged and reported as absent rather than as an error. A
/// corrupt document is also removed from the store.
pub fn load_json<T: DeserializeOwned>(store: &dyn StateStore, namespace: Namespace) -> Option<T> {
    let document = match store.load(namespace) {
        Ok(Some(document)) => document,
        Ok(None) => return None,
        Err(e) => {
            warn!(namespace = namespace.key(), error = %e, "Failed to read persisted state");
            return None;
        }
    };

    match serde_json::from_str::<Envelope<T>>(&document) {
        Ok(envelope) => {
            debug!(
                namespace = namespace.key(),
                saved_at = %envelope.saved_at,
                "Loaded persisted state"
            );
            Some(envelope.state)
        }
        Err(e) => {
            warn!(namespace = namespace.key(), error = %e, "Discarding corrupt persisted state");
            if let Err(e) = store.remove(namespace) {
                warn!(namespace = namespace.key(), error = %e, "Failed to remove corrupt state");
            }
            None
        }
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-process store. Each namespace has its own lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cart_ledger: Mutex<Option<String>>,
    pagination_metadata: Mutex<Option<String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn slot(&self, namespace: Namespace) -> &Mutex<Option<String>> {
        match namespace {
            Namespace::CartLedger => &self.cart_ledger,
            Namespace::PaginationMetadata => &self.pagination_metadata,
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self, namespace: Namespace) -> Result<Option<String>, StoreError> {
        Ok(self
            .slot(namespace)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, namespace: Namespace, document: &str) -> Result<(), StoreError> {
        *self
            .slot(namespace)
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(document.to_string());
        Ok(())
    }

    fn remove(&self, namespace: Namespace) -> Result<(), StoreError> {
        *self
            .slot(namespace)
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// One JSON document per namespace inside a directory.
///
/// Writes go to a temporary sibling first and are then renamed into place,
/// so a crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Directory backing this store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, namespace: Namespace) -> PathBuf {
        self.dir.join(format!("{}.json", namespace.key()))
    }
}

impl StateStore for FileStore {
    fn load(&self, namespace: Namespace) -> Result<Option<String>, StoreError> {
        let path = self.path(namespace);
        match fs::read_to_string(&path) {
            Ok(document) => Ok(Some(document)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn save(&self, namespace: Namespace, document: &str) -> Result<(), StoreError> {
        let path = self.path(namespace);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, document).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }

    fn remove(&self, namespace: Namespace) -> Result<(), StoreError> {
        let path = self.path(namespace);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}
