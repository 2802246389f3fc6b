//! In-memory catalog source for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shop_sync_core::{CurrencyCode, FetchedPage, Price, Product, ProductId};

use crate::source::{CatalogSource, SourceError};
use crate::store::{MemoryStore, Namespace, StateStore, StoreError};

/// Build a product with an edge cursor derived from its id.
pub fn product(id: i64, price: &str) -> Product {
    Product {
        id: format!("product:{id}"),
        product_id: ProductId::new(id),
        name: format!("Product {id}"),
        price: Price::new(price.parse::<Decimal>().unwrap(), CurrencyCode::USD),
        categories: Vec::new(),
        image_url: None,
        cursor: Some(format!("edge:{id}")),
    }
}

/// Offset-backed source: the cursor `after:N` resumes at index `N`.
#[derive(Default)]
pub struct FakeSource {
    listing: Vec<Product>,
    extras: HashMap<ProductId, Product>,
    delay: Mutex<Duration>,
    fail_pages: AtomicBool,
    fail_lookups: AtomicBool,
    page_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_products(count: i64) -> Self {
        Self {
            listing: (1..=count).map(|id| product(100 + id, "10.00")).collect(),
            ..Self::default()
        }
    }

    pub fn with_listing(listing: Vec<Product>) -> Self {
        Self {
            listing,
            ..Self::default()
        }
    }

    /// Product reachable only through `fetch_product_by_id`.
    pub fn add_extra(&mut self, product: Product) {
        self.extras.insert(product.product_id, product);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_pages(&self, fail: bool) {
        self.fail_pages.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CatalogSource for FakeSource {
    async fn fetch_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<FetchedPage, SourceError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if self.fail_pages.load(Ordering::SeqCst) {
            return Err(SourceError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let start = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix("after:")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| SourceError::Data(format!("unknown cursor {c}")))?,
        };
        let end = (start + page_size as usize).min(self.listing.len());
        let items = self.listing.get(start..end).unwrap_or_default().to_vec();
        let has_next_page = end < self.listing.len();

        Ok(FetchedPage {
            items,
            has_next_page,
            next_cursor: has_next_page.then(|| format!("after:{end}")),
        })
    }

    async fn fetch_total_count(&self) -> Result<u64, SourceError> {
        Ok(self.listing.len() as u64)
    }

    async fn fetch_product_by_id(&self, id: ProductId) -> Result<Option<Product>, SourceError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(SourceError::Status {
                status: 500,
                body: "lookup failed".to_string(),
            });
        }

        Ok(self
            .listing
            .iter()
            .find(|p| p.product_id == id)
            .or_else(|| self.extras.get(&id))
            .cloned())
    }
}

/// Memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_saves: AtomicBool,
}

impl FlakyStore {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl StateStore for FlakyStore {
    fn load(&self, namespace: Namespace) -> Result<Option<String>, StoreError> {
        self.inner.load(namespace)
    }

    fn save(&self, namespace: Namespace, document: &str) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from(namespace.key()),
                source: io::Error::other("disk full"),
            });
        }
        self.inner.save(namespace, document)
    }

    fn remove(&self, namespace: Namespace) -> Result<(), StoreError> {
        self.inner.remove(namespace)
    }
}
