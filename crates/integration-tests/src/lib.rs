//! Integration tests for Shop Sync.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shop-sync-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `catalog_pagination` - cursor chain, coalescing, stale responses
//! - `cart_ledger` - ledger invariants and persistence
//! - `cart_aggregation` - priced cart view and product resolution
//! - `hydration` - server-rendered vs persisted startup state
//!
//! Tests run against [`ScriptedSource`], an in-memory catalog whose
//! responses can be delayed or made to fail.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shop_sync::{CatalogSource, FileStore, MemoryStore, ShopState, SourceError, StateStore};
use shop_sync_core::{CurrencyCode, FetchedPage, Price, Product, ProductId};

/// Build a catalog product. The edge cursor encodes the listing offset.
#[must_use]
pub fn product(id: i64, price: &str) -> Product {
    Product {
        id: format!("cHJvZHVjdDo{id}"),
        product_id: ProductId::new(id),
        name: format!("Product {id}"),
        price: Price::new(price.parse::<Decimal>().unwrap(), CurrencyCode::USD),
        categories: vec!["Test".to_string()],
        image_url: Some(format!("https://cdn.example.com/{id}.jpg")),
        cursor: None,
    }
}

/// A scripted failure for the next page request.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Non-success HTTP status.
    Status(u16),
    /// 429 with a retry hint.
    RateLimited,
    /// Response parsed but lacks required fields.
    Malformed,
}

impl Failure {
    fn into_error(self) -> SourceError {
        match self {
            Self::Status(status) => SourceError::Status {
                status,
                body: "scripted failure".to_string(),
            },
            Self::RateLimited => SourceError::RateLimited(1),
            Self::Malformed => SourceError::Data("products field missing".to_string()),
        }
    }
}

/// In-memory catalog source.
///
/// Pages are cut from one listing; the cursor `cursor-N` resumes at offset
/// `N`. Calls are counted per page number.
#[derive(Default)]
pub struct ScriptedSource {
    listing: Vec<Product>,
    hidden: HashMap<ProductId, Product>,
    unknown: HashSet<ProductId>,
    failures: Mutex<VecDeque<Failure>>,
    page_delays: Mutex<HashMap<u32, Duration>>,
    lookup_delay: Mutex<Duration>,
    page_calls: Mutex<HashMap<u32, usize>>,
    lookup_calls: AtomicUsize,
}

impl ScriptedSource {
    /// `count` products with ids `101..` priced at 10.00.
    #[must_use]
    pub fn with_products(count: i64) -> Self {
        Self::with_listing((1..=count).map(|i| product(100 + i, "10.00")).collect())
    }

    #[must_use]
    pub fn with_listing(listing: Vec<Product>) -> Self {
        let listing = listing
            .into_iter()
            .enumerate()
            .map(|(offset, mut p)| {
                p.cursor = Some(format!("cursor-{}", offset + 1));
                p
            })
            .collect();
        Self {
            listing,
            ..Self::default()
        }
    }

    /// A product that is not listed but can be looked up by id.
    #[must_use]
    pub fn with_hidden(mut self, product: Product) -> Self {
        self.hidden.insert(product.product_id, product);
        self
    }

    /// A listed product that lookups by id report as missing.
    #[must_use]
    pub fn with_unknown(mut self, id: i64) -> Self {
        self.unknown.insert(ProductId::new(id));
        self
    }

    /// Fail the next page request.
    pub fn fail_next(&self, failure: Failure) {
        self.failures.lock().unwrap().push_back(failure);
    }

    pub fn delay_page(&self, page: u32, delay: Duration) {
        self.page_delays.lock().unwrap().insert(page, delay);
    }

    pub fn delay_lookups(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = delay;
    }

    /// Requests made for `page`.
    #[must_use]
    pub fn calls_for(&self, page: u32) -> usize {
        self.page_calls
            .lock()
            .unwrap()
            .get(&page)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn total_page_calls(&self) -> usize {
        self.page_calls.lock().unwrap().values().sum()
    }

    #[must_use]
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// First page and count as a server render would deliver them.
    #[must_use]
    pub fn first_page(&self, page_size: u32) -> FetchedPage {
        self.slice(0, page_size)
    }

    fn slice(&self, offset: usize, page_size: u32) -> FetchedPage {
        let end = (offset + page_size as usize).min(self.listing.len());
        let items = self.listing.get(offset..end).unwrap_or_default().to_vec();
        let has_next_page = end < self.listing.len();
        FetchedPage {
            next_cursor: has_next_page.then(|| format!("cursor-{end}")),
            items,
            has_next_page,
        }
    }
}

#[async_trait]
impl CatalogSource for ScriptedSource {
    async fn fetch_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<FetchedPage, SourceError> {
        let offset = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix("cursor-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| SourceError::Data(format!("unknown cursor {c}")))?,
        };
        let page = u32::try_from(offset / page_size.max(1) as usize).unwrap() + 1;

        *self.page_calls.lock().unwrap().entry(page).or_default() += 1;

        let delay = self.page_delays.lock().unwrap().get(&page).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error());
        }

        Ok(self.slice(offset, page_size))
    }

    async fn fetch_total_count(&self) -> Result<u64, SourceError> {
        Ok(self.listing.len() as u64)
    }

    async fn fetch_product_by_id(&self, id: ProductId) -> Result<Option<Product>, SourceError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.lookup_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.unknown.contains(&id) {
            return Ok(None);
        }
        Ok(self
            .listing
            .iter()
            .find(|p| p.product_id == id)
            .or_else(|| self.hidden.get(&id))
            .cloned())
    }
}

/// A shop wired to a scripted source and a shared store.
pub struct TestContext {
    pub source: Arc<ScriptedSource>,
    pub store: Arc<dyn StateStore>,
    pub per_page: u32,
}

impl TestContext {
    /// In-memory store.
    #[must_use]
    pub fn new(source: ScriptedSource, per_page: u32) -> Self {
        Self {
            source: Arc::new(source),
            store: Arc::new(MemoryStore::new()),
            per_page,
        }
    }

    /// File store in a fresh temporary directory.
    #[must_use]
    pub fn on_disk(source: ScriptedSource, per_page: u32, name: &str) -> (Self, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "shop-sync-it-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        let store = FileStore::open(&dir).unwrap();
        (
            Self {
                source: Arc::new(source),
                store: Arc::new(store),
                per_page,
            },
            dir,
        )
    }

    /// A new shop over the same source and store, like a page reload.
    #[must_use]
    pub fn shop(&self) -> ShopState {
        ShopState::new(
            Arc::clone(&self.source) as Arc<dyn CatalogSource>,
            Arc::clone(&self.store),
            self.per_page,
        )
    }
}
