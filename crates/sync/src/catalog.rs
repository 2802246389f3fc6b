//! Page-indexed catalog cache.
//!
//! # Cursor chain
//!
//! The catalog is cursor-paginated: the cursor needed to fetch page `n + 1`
//! is only known once page `n` has been fetched. `cursors[k]` holds the cursor
//! for page `k + 1`; `cursors[0]` is always `None` (page 1 needs no cursor)
//! and, for `k >= 1`, `Some(None)` means page `k` was the last one.
//!
//! # Concurrency
//!
//! State lives in a `watch` channel and is only mutated inside
//! `send_modify`/`send_if_modified`, never across an `.await`. Page fetches
//! are coalesced through a `moka` cache keyed by `(epoch, page)`, so a second
//! caller for a page that is already being fetched waits on the same request.
//!
//! Two counters discard out-of-order responses:
//!
//! - `epoch` bumps on [`CatalogCache::reset_pagination`]; a response fetched
//!   under an older epoch is dropped with [`SyncError::Superseded`].
//! - the navigation ticket bumps on every navigation; only the latest one
//!   moves `current_page`, while pages fetched by older ones stay cached.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use shop_sync_core::{FetchedPage, Product, ProductId, total_pages};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::source::CatalogSource;
use crate::store::{self, Namespace, StateStore};

/// Upper bound on concurrently coalesced page fetches.
const IN_FLIGHT_CAPACITY: u64 = 64;

// =============================================================================
// CatalogSnapshot
// =============================================================================

/// Observable catalog state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSnapshot {
    /// Page currently shown. Within `[1, total_pages]` once the count is known.
    pub current_page: u32,
    pub per_page: u32,
    /// `None` until the total count has been set.
    pub total_products: Option<u64>,
    pub total_pages: Option<u32>,
    /// Fetched pages by page number.
    pub pages: BTreeMap<u32, Vec<Product>>,
    /// Cursor chain, see the module docs.
    pub cursors: BTreeMap<u32, Option<String>>,
    /// Bumped on every reset.
    pub epoch: u64,
    /// Number of outstanding navigations.
    pub pending: u32,
}

impl CatalogSnapshot {
    fn new(per_page: u32) -> Self {
        Self {
            current_page: 1,
            per_page,
            total_products: None,
            total_pages: None,
            pages: BTreeMap::new(),
            cursors: BTreeMap::from([(0, None)]),
            epoch: 0,
            pending: 0,
        }
    }

    /// Items of the current page, empty if it has not been loaded.
    #[must_use]
    pub fn current_items(&self) -> &[Product] {
        self.page(self.current_page).unwrap_or_default()
    }

    #[must_use]
    pub fn page(&self, page: u32) -> Option<&[Product]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    /// Search every loaded page, not just the current one.
    #[must_use]
    pub fn find_product(&self, product_id: ProductId) -> Option<&Product> {
        self.pages
            .values()
            .flatten()
            .find(|p| p.product_id == product_id)
    }

    /// Whether a navigation is outstanding.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.pending > 0
    }

    fn check_range(&self, page: u32) -> Result<()> {
        let last_page = self.total_pages.map(|pages| pages.max(1));
        if page == 0 || last_page.is_some_and(|last| page > last) {
            return Err(SyncError::PageOutOfRange {
                page,
                last_page: last_page.unwrap_or(0),
            });
        }
        Ok(())
    }

    /// Cursor needed to fetch `page`.
    fn cursor_for(&self, page: u32) -> Result<Option<String>> {
        match self.cursors.get(&(page - 1)) {
            None => Err(SyncError::SequenceGap { page }),
            Some(None) if page > 1 => Err(SyncError::PageOutOfRange {
                page,
                last_page: page - 1,
            }),
            Some(cursor) => Ok(cursor.clone()),
        }
    }

    /// Highest page not after `target` whose cursor is already known.
    fn chain_start(&self, target: u32) -> u32 {
        (1..=target)
            .rev()
            .find(|page| self.cursors.contains_key(&(page - 1)))
            .unwrap_or(1)
    }
}

/// Result of a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// `page` is now the current page.
    Applied { page: u32, items: Vec<Product> },
    /// A later navigation finished first; the current page was left alone.
    Superseded { page: u32 },
}

impl Navigation {
    #[must_use]
    pub const fn page(&self) -> u32 {
        match self {
            Self::Applied { page, .. } | Self::Superseded { page } => *page,
        }
    }

    #[must_use]
    pub fn items(&self) -> Option<&[Product]> {
        match self {
            Self::Applied { items, .. } => Some(items),
            Self::Superseded { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Stored form of the pagination state.
///
/// Cursors are not stored: restored pages after the first are shown from
/// the cache, and moving past them replays the chain from page 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMetadata {
    pub current_page: u32,
    pub total_products: Option<u64>,
    pub products_per_page: u32,
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub page_data: BTreeMap<u32, Vec<Product>>,
}

impl From<&CatalogSnapshot> for PaginationMetadata {
    fn from(snapshot: &CatalogSnapshot) -> Self {
        Self {
            current_page: snapshot.current_page,
            total_products: snapshot.total_products,
            products_per_page: snapshot.per_page,
            total_pages: snapshot.total_pages,
            page_data: snapshot.pages.clone(),
        }
    }
}

/// Write the pagination metadata. If the write fails the previous document
/// is removed, so a later restore never adopts state older than memory.
fn persist(store: &dyn StateStore, snapshot: &CatalogSnapshot) {
    let metadata = PaginationMetadata::from(snapshot);
    if let Err(e) = store::save_json(store, Namespace::PaginationMetadata, &metadata) {
        warn!(error = %e, "Failed to persist pagination metadata, dropping stored copy");
        if let Err(e) = store.remove(Namespace::PaginationMetadata) {
            warn!(error = %e, "Failed to remove stale pagination metadata");
        }
    }
}

/// Keeps `pending` raised for the lifetime of a navigation.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<CatalogSnapshot>,
}

impl<'a> LoadingGuard<'a> {
    fn new(state: &'a watch::Sender<CatalogSnapshot>) -> Self {
        state.send_modify(|s| s.pending += 1);
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .send_modify(|s| s.pending = s.pending.saturating_sub(1));
    }
}

// =============================================================================
// CatalogCache
// =============================================================================

/// Page cache and cursor chain over a [`CatalogSource`].
///
/// Cheap to clone; clones share state and in-flight fetches.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CatalogCacheInner>,
}

struct CatalogCacheInner {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn StateStore>,
    per_page: u32,
    state: watch::Sender<CatalogSnapshot>,
    in_flight: Cache<(u64, u32), FetchedPage>,
    navigation: AtomicU64,
}

impl CatalogCache {
    /// Create an empty cache. Persisted state is only read by
    /// [`CatalogCache::restore_persisted`].
    #[must_use]
    pub fn new(source: Arc<dyn CatalogSource>, store: Arc<dyn StateStore>, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        let (state, _) = watch::channel(CatalogSnapshot::new(per_page));
        let in_flight = Cache::builder().max_capacity(IN_FLIGHT_CAPACITY).build();

        Self {
            inner: Arc::new(CatalogCacheInner {
                source,
                store,
                per_page,
                state,
                in_flight,
                navigation: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to catalog changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CatalogSnapshot> {
        self.inner.state.subscribe()
    }

    /// Clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn current_page(&self) -> u32 {
        self.inner.state.borrow().current_page
    }

    #[must_use]
    pub fn current_items(&self) -> Vec<Product> {
        self.inner.state.borrow().current_items().to_vec()
    }

    #[must_use]
    pub fn find_product(&self, product_id: ProductId) -> Option<Product> {
        self.inner.state.borrow().find_product(product_id).cloned()
    }

    #[must_use]
    pub fn per_page(&self) -> u32 {
        self.inner.per_page
    }

    /// Fetch `page`, store it and make it the current page.
    ///
    /// # Errors
    ///
    /// - [`SyncError::PageOutOfRange`] if `page` is outside the known extent.
    /// - [`SyncError::SequenceGap`] if page `page - 1` has not been fetched.
    /// - [`SyncError::Transport`] / [`SyncError::Data`] if the fetch failed;
    ///   nothing is committed.
    /// - [`SyncError::Superseded`] if the pagination was reset meanwhile.
    #[instrument(skip(self))]
    pub async fn load_page(&self, page: u32) -> Result<Navigation> {
        let ticket = self.begin_navigation();
        let _loading = LoadingGuard::new(&self.inner.state);

        let items = self.fetch_into_cache(page).await?;
        Ok(self.finish_navigation(ticket, page, items))
    }

    /// Cached items of `page`, loading it if needed.
    ///
    /// # Errors
    ///
    /// Same as [`CatalogCache::load_page`].
    #[instrument(skip(self))]
    pub async fn get_page(&self, page: u32) -> Result<Vec<Product>> {
        let cached = self.cached_page(page);
        if let Some(items) = cached {
            debug!("Catalog page cache hit");
            return Ok(items);
        }

        match self.load_page(page).await? {
            Navigation::Applied { items, .. } => Ok(items),
            Navigation::Superseded { page } => {
                self.cached_page(page).ok_or(SyncError::Superseded { page })
            }
        }
    }

    /// Navigate to `page`, walking the cursor chain forward from the last
    /// known cursor and reusing cached pages.
    ///
    /// A broken chain is replayed from page 1. An empty page after the
    /// first falls back to page 1.
    ///
    /// # Errors
    ///
    /// [`SyncError::PageOutOfRange`] before any fetch, or the first fetch
    /// failure along the walk. On error the current page is unchanged.
    #[instrument(skip(self))]
    pub async fn go_to_page(&self, page: u32) -> Result<Navigation> {
        let cached = {
            let snapshot = self.inner.state.borrow();
            snapshot.check_range(page)?;
            if snapshot.current_page == page
                && let Some(items) = snapshot.pages.get(&page)
            {
                // Still the latest intent: outstanding navigations lose.
                self.begin_navigation();
                return Ok(Navigation::Applied {
                    page,
                    items: items.clone(),
                });
            }
            snapshot.pages.get(&page).cloned()
        };

        let ticket = self.begin_navigation();
        let _loading = LoadingGuard::new(&self.inner.state);

        let items = if let Some(items) = cached {
            items
        } else {
            let start = self.inner.state.borrow().chain_start(page);
            let walked = match self.walk(start, page).await {
                Err(SyncError::SequenceGap { page: gap }) => {
                    warn!(page, gap, "Cursor chain broken, replaying from page 1");
                    self.walk(1, page).await
                }
                other => other,
            };

            match walked {
                Ok(items) => items,
                Err(SyncError::Superseded { .. }) => return Ok(Navigation::Superseded { page }),
                Err(e) => return Err(e),
            }
        };

        if items.is_empty() && page > 1 {
            warn!(page, "Catalog page came back empty, falling back to page 1");
            let first = match self.cached_page(1) {
                Some(first) => first,
                None => self.fetch_into_cache(1).await?,
            };
            return Ok(self.finish_navigation(ticket, 1, first));
        }

        Ok(self.finish_navigation(ticket, page, items))
    }

    /// Navigate one page forward. `Ok(None)` on the last page.
    ///
    /// # Errors
    ///
    /// Same as [`CatalogCache::go_to_page`].
    pub async fn next_page(&self) -> Result<Option<Navigation>> {
        let (current, at_end) = {
            let snapshot = self.inner.state.borrow();
            let at_end = snapshot
                .total_pages
                .is_some_and(|pages| snapshot.current_page >= pages)
                || matches!(snapshot.cursors.get(&snapshot.current_page), Some(None));
            (snapshot.current_page, at_end)
        };

        if at_end {
            return Ok(None);
        }
        self.go_to_page(current + 1).await.map(Some)
    }

    /// Navigate one page back. `Ok(None)` on page 1.
    ///
    /// # Errors
    ///
    /// Same as [`CatalogCache::go_to_page`].
    pub async fn prev_page(&self) -> Result<Option<Navigation>> {
        let current = self.current_page();
        if current <= 1 {
            return Ok(None);
        }
        self.go_to_page(current - 1).await.map(Some)
    }

    /// Replace page 1 unconditionally and drop every later page.
    ///
    /// `initial_cursor` is the cursor for page 2 (`None` if page 1 is the
    /// last page). Outstanding fetches from before the reset are discarded
    /// when they complete.
    #[instrument(skip(self, items, initial_cursor), fields(item_count = items.len()))]
    pub fn reset_pagination(&self, items: Vec<Product>, initial_cursor: Option<String>) {
        let store = self.inner.store.as_ref();
        let navigation = &self.inner.navigation;
        let mut epoch = 0;

        self.inner.state.send_modify(|s| {
            s.epoch += 1;
            epoch = s.epoch;
            navigation.fetch_add(1, Ordering::SeqCst);

            s.pages = BTreeMap::from([(1, items)]);
            s.cursors = BTreeMap::from([(0, None), (1, initial_cursor)]);
            s.current_page = 1;
            persist(store, s);
        });
        self.inner.in_flight.invalidate_all();

        info!(epoch, "Catalog pagination reset");
    }

    /// Record the total product count, clamping the current page.
    pub fn set_total_count(&self, total_products: u64) {
        let store = self.inner.store.as_ref();
        self.inner.state.send_if_modified(|s| {
            let pages = total_pages(total_products, s.per_page);
            let current_page = s.current_page.min(pages.max(1));
            if s.total_products == Some(total_products) && s.current_page == current_page {
                return false;
            }

            s.total_products = Some(total_products);
            s.total_pages = Some(pages);
            s.current_page = current_page;
            persist(store, s);
            debug!(total_products, total_pages = pages, "Catalog count updated");
            true
        });
    }

    /// Fetch the total count from the source and apply it.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails.
    #[instrument(skip(self))]
    pub async fn refresh_total_count(&self) -> Result<u64> {
        let total = self.inner.source.fetch_total_count().await?;
        self.set_total_count(total);
        Ok(total)
    }

    /// Adopt persisted pagination state, if any.
    ///
    /// Only applies while no page has been loaded, and only if the stored
    /// page size matches. Returns the number of restored pages.
    pub fn restore_persisted(&self) -> Option<usize> {
        let metadata: PaginationMetadata =
            store::load_json(self.inner.store.as_ref(), Namespace::PaginationMetadata)?;

        let mut restored = None;
        self.inner.state.send_if_modified(|s| {
            if !s.pages.is_empty() {
                debug!("Catalog already populated, ignoring persisted pages");
                return false;
            }
            if metadata.products_per_page != s.per_page {
                info!(
                    stored = metadata.products_per_page,
                    current = s.per_page,
                    "Page size changed, discarding persisted pages"
                );
                return false;
            }

            s.epoch += 1;
            s.total_products = metadata.total_products;
            s.total_pages = metadata
                .total_products
                .map(|total| total_pages(total, s.per_page));
            s.pages = metadata
                .page_data
                .into_iter()
                .filter(|(page, _)| *page >= 1)
                .collect();
            s.cursors = BTreeMap::from([(0, None)]);

            let last_page = s.total_pages.map_or(u32::MAX, |pages| pages.max(1));
            s.current_page = metadata.current_page.clamp(1, last_page);

            restored = Some(s.pages.len());
            true
        });

        if let Some(pages) = restored {
            self.inner.navigation.fetch_add(1, Ordering::SeqCst);
            self.inner.in_flight.invalidate_all();
            info!(pages, "Restored persisted catalog pages");
        }
        restored
    }

    fn cached_page(&self, page: u32) -> Option<Vec<Product>> {
        self.inner.state.borrow().pages.get(&page).cloned()
    }

    fn begin_navigation(&self) -> u64 {
        self.inner.navigation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Move `current_page` if `ticket` is still the latest navigation.
    fn finish_navigation(&self, ticket: u64, page: u32, items: Vec<Product>) -> Navigation {
        let store = self.inner.store.as_ref();
        let navigation = &self.inner.navigation;
        let mut applied = false;

        self.inner.state.send_if_modified(|s| {
            if navigation.load(Ordering::SeqCst) != ticket {
                return false;
            }
            applied = true;
            if s.current_page == page {
                return false;
            }
            s.current_page = page;
            persist(store, s);
            true
        });

        if applied {
            info!(page, "Catalog page changed");
            Navigation::Applied { page, items }
        } else {
            debug!(page, "Navigation superseded by a later one");
            Navigation::Superseded { page }
        }
    }

    /// Fetch pages `from..=to` in order, skipping pages whose successor
    /// cursor is already known. Returns the items of `to`.
    async fn walk(&self, from: u32, to: u32) -> Result<Vec<Product>> {
        for page in from..to {
            let known = self.inner.state.borrow().cursors.contains_key(&page);
            if !known {
                self.fetch_into_cache(page).await?;
            }
        }
        self.fetch_into_cache(to).await
    }

    /// Fetch one page (coalescing with any identical in-flight fetch) and
    /// commit it if the chain it was fetched against is still current.
    async fn fetch_into_cache(&self, page: u32) -> Result<Vec<Product>> {
        let (epoch, cursor) = {
            let snapshot = self.inner.state.borrow();
            snapshot.check_range(page)?;
            (snapshot.epoch, snapshot.cursor_for(page)?)
        };

        let key = (epoch, page);
        let source = Arc::clone(&self.inner.source);
        let per_page = self.inner.per_page;
        let request_cursor = cursor.clone();

        let fetched = self
            .inner
            .in_flight
            .try_get_with(key, async move {
                debug!(page, epoch, "Fetching catalog page");
                source.fetch_page(per_page, request_cursor.as_deref()).await
            })
            .await
            .map_err(|e| {
                warn!(page, error = %e, "Catalog page fetch failed");
                SyncError::from(e)
            })?;

        let continuation = fetched.continuation();
        let store = self.inner.store.as_ref();
        let mut stale = false;

        self.inner.state.send_if_modified(|s| {
            if s.epoch != epoch || s.cursors.get(&(page - 1)) != Some(&cursor) {
                stale = true;
                return false;
            }
            if fetched.items.is_empty() && page > 1 {
                // Never shown, so never cached: a later visit asks again.
                return false;
            }

            let previous = s.cursors.get(&page).cloned();
            if s.pages.get(&page) == Some(&fetched.items)
                && previous.as_ref() == Some(&continuation)
            {
                return false;
            }
            if previous.is_some_and(|prev| prev != continuation) {
                // Later pages were reached through a different cursor.
                s.pages.retain(|k, _| *k <= page);
                s.cursors.retain(|k, _| *k <= page);
            }

            s.pages.insert(page, fetched.items.clone());
            s.cursors.insert(page, continuation);
            persist(store, s);
            debug!(page, items = fetched.items.len(), "Catalog page stored");
            true
        });

        self.inner.in_flight.invalidate(&key).await;

        if stale {
            warn!(page, epoch, "Discarding catalog page fetched against a stale cursor chain");
            return Err(SyncError::Superseded { page });
        }
        Ok(fetched.items)
    }
}
