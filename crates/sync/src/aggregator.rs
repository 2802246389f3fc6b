//! Priced cart view derived from the ledger and the catalog.
//!
//! The view is never stored as independently mutable state: every read
//! recomputes it from the current ledger, the current catalog snapshot and
//! the table of single-item lookups. [`CartAggregator::run`] republishes it on
//! a `watch` channel whenever one of those inputs changes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use moka::future::Cache;
use rust_decimal::Decimal;
use shop_sync_core::{
    CartLine, CartLineDetail, CurrencyCode, Price, Product, ProductId, Resolution,
    ResolutionWarning, round_currency,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::catalog::{CatalogCache, CatalogSnapshot};
use crate::ledger::{CartLedger, LedgerState};
use crate::source::CatalogSource;

const LOOKUP_CAPACITY: u64 = 256;

/// The aggregated cart as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    /// One detail per ledger line, in ledger order.
    pub lines: Vec<CartLineDetail>,
    /// Sum of line totals, rounded once to two decimals.
    pub subtotal: Price,
    /// Sum of quantities.
    pub item_count: u32,
    /// Lines that fell back to the placeholder.
    pub warnings: Vec<ResolutionWarning>,
    /// Whether a single-item lookup is outstanding.
    pub resolving: bool,
}

impl Default for CartView {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            subtotal: Price::zero(CurrencyCode::default()),
            item_count: 0,
            warnings: Vec::new(),
            resolving: false,
        }
    }
}

impl CartView {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Subtotal with currency symbol, e.g. `$29.97`.
    #[must_use]
    pub fn formatted_subtotal(&self) -> String {
        self.subtotal.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    Found(Product),
    Failed(String),
}

/// Results of single-item lookups for products missing from the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LookupTable {
    entries: HashMap<ProductId, Lookup>,
    pending: HashSet<ProductId>,
}

/// Join ledger lines with products.
///
/// Resolution order per line: any loaded catalog page, then a finished
/// lookup, otherwise the placeholder (pending or failed).
fn derive_view(lines: &[CartLine], catalog: &CatalogSnapshot, lookups: &LookupTable) -> CartView {
    let mut warnings = Vec::new();
    let mut resolving = false;

    let details: Vec<CartLineDetail> = lines
        .iter()
        .map(|line| {
            let id = line.product_id;
            let (product, resolution) = if let Some(product) = catalog.find_product(id) {
                (product.clone(), Resolution::Catalog)
            } else {
                match lookups.entries.get(&id) {
                    Some(Lookup::Found(product)) => (product.clone(), Resolution::Lookup),
                    Some(Lookup::Failed(reason)) => {
                        warnings.push(ResolutionWarning {
                            product_id: id,
                            reason: reason.clone(),
                        });
                        (Product::placeholder(id), Resolution::Placeholder)
                    }
                    None => {
                        resolving = true;
                        (Product::placeholder(id), Resolution::Pending)
                    }
                }
            };
            CartLineDetail {
                line: *line,
                product,
                resolution,
            }
        })
        .collect();

    let total: Decimal = details.iter().map(CartLineDetail::line_total).sum();
    let currency = details
        .iter()
        .find(|d| d.is_resolved())
        .map_or_else(CurrencyCode::default, |d| d.product.price.currency_code);

    CartView {
        item_count: lines
            .iter()
            .fold(0u32, |acc, l| acc.saturating_add(l.quantity)),
        subtotal: Price::new(round_currency(total), currency),
        lines: details,
        warnings,
        resolving,
    }
}

// =============================================================================
// CartAggregator
// =============================================================================

/// Derives [`CartView`]s from a [`CartLedger`] and a [`CatalogCache`].
///
/// Depends on both through their subscriptions only; neither knows about
/// the aggregator. Cheap to clone.
#[derive(Clone)]
pub struct CartAggregator {
    inner: Arc<CartAggregatorInner>,
}

struct CartAggregatorInner {
    ledger: watch::Receiver<LedgerState>,
    catalog: watch::Receiver<CatalogSnapshot>,
    source: Arc<dyn CatalogSource>,
    lookups: watch::Sender<LookupTable>,
    in_flight: Cache<ProductId, Option<Product>>,
    view: watch::Sender<CartView>,
}

impl CartAggregator {
    #[must_use]
    pub fn new(
        ledger: &CartLedger,
        catalog: &CatalogCache,
        source: Arc<dyn CatalogSource>,
    ) -> Self {
        let (lookups, _) = watch::channel(LookupTable::default());
        let (view, _) = watch::channel(CartView::default());

        let aggregator = Self {
            inner: Arc::new(CartAggregatorInner {
                ledger: ledger.subscribe(),
                catalog: catalog.subscribe(),
                source,
                lookups,
                in_flight: Cache::builder().max_capacity(LOOKUP_CAPACITY).build(),
                view,
            }),
        };
        aggregator.publish();
        aggregator
    }

    /// Freshly derived view.
    #[must_use]
    pub fn view(&self) -> CartView {
        let ledger = self.inner.ledger.borrow();
        let catalog = self.inner.catalog.borrow();
        let lookups = self.inner.lookups.borrow();
        derive_view(ledger.lines(), &catalog, &lookups)
    }

    #[must_use]
    pub fn line_details(&self) -> Vec<CartLineDetail> {
        self.view().lines
    }

    /// Rounded subtotal amount.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.view().subtotal.amount
    }

    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.inner.ledger.borrow().total_quantity()
    }

    /// Whether any single-item lookup is outstanding.
    #[must_use]
    pub fn is_resolving(&self) -> bool {
        !self.inner.lookups.borrow().pending.is_empty()
    }

    /// Views published by [`CartAggregator::publish`] and [`CartAggregator::run`].
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartView> {
        self.inner.view.subscribe()
    }

    /// Recompute the view and notify subscribers if it changed.
    pub fn publish(&self) {
        let next = self.view();
        self.inner.view.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Look up every ledger product that is neither in the catalog nor
    /// already looked up, concurrently. Returns the number of lookups made.
    ///
    /// Failures are recorded, logged and surface as placeholder lines with a
    /// [`ResolutionWarning`]; they are never returned as errors.
    #[instrument(skip(self))]
    pub async fn resolve_missing(&self) -> usize {
        let candidates: Vec<ProductId> = {
            let ledger = self.inner.ledger.borrow();
            let catalog = self.inner.catalog.borrow();
            ledger
                .lines()
                .iter()
                .map(|l| l.product_id)
                .filter(|id| catalog.find_product(*id).is_none())
                .collect()
        };

        let mut claimed = Vec::new();
        self.inner.lookups.send_if_modified(|table| {
            for id in candidates {
                if !table.entries.contains_key(&id) && table.pending.insert(id) {
                    claimed.push(id);
                }
            }
            !claimed.is_empty()
        });

        if claimed.is_empty() {
            return 0;
        }
        self.publish();
        debug!(count = claimed.len(), "Looking up products missing from the catalog");

        let mut tasks = JoinSet::new();
        for &id in &claimed {
            let inner = Arc::clone(&self.inner);
            tasks.spawn(async move {
                let source = Arc::clone(&inner.source);
                let result = inner
                    .in_flight
                    .try_get_with(id, async move { source.fetch_product_by_id(id).await })
                    .await;
                inner.in_flight.invalidate(&id).await;
                (id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (id, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "Product lookup task failed");
                    continue;
                }
            };

            let lookup = match result {
                Ok(Some(product)) => Lookup::Found(product),
                Ok(None) => {
                    warn!(product_id = %id, "Cart product not found in catalog");
                    Lookup::Failed("not found in catalog".to_string())
                }
                Err(e) => {
                    warn!(product_id = %id, error = %e, "Cart product lookup failed");
                    Lookup::Failed(e.to_string())
                }
            };

            self.inner.lookups.send_modify(|table| {
                table.pending.remove(&id);
                table.entries.insert(id, lookup);
            });
        }

        // Tasks that died without reporting must not stay pending.
        self.inner.lookups.send_if_modified(|table| {
            let before = table.pending.len();
            table.pending.retain(|id| !claimed.contains(id));
            table.pending.len() != before
        });

        self.publish();
        claimed.len()
    }

    /// Keep the published view current until the ledger or the catalog is
    /// dropped. Lookups for newly missing products are started on every
    /// change.
    pub async fn run(self) {
        let mut ledger = self.inner.ledger.clone();
        let mut catalog = self.inner.catalog.clone();
        let mut lookups = self.inner.lookups.subscribe();

        loop {
            ledger.borrow_and_update();
            catalog.borrow_and_update();
            lookups.borrow_and_update();

            self.publish();
            let resolver = self.clone();
            tokio::spawn(async move {
                resolver.resolve_missing().await;
            });

            let changed = tokio::select! {
                changed = ledger.changed() => changed,
                changed = catalog.changed() => changed,
                changed = lookups.changed() => changed,
            };
            if changed.is_err() {
                break;
            }
        }

        debug!("Cart aggregator stopped");
    }
}
