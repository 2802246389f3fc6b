//! Startup reconciliation of server-rendered and persisted state.
//!
//! Precedence:
//!
//! 1. A server-rendered first page always wins for page 1 and the count.
//! 2. Without one, persisted pagination metadata is restored, once.
//! 3. The cart ledger is never touched: it is persisted on its own and
//!    outlives any catalog snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use shop_sync_core::FetchedPage;
use tracing::{info, instrument};

use crate::catalog::CatalogCache;
use crate::error::Result;
use crate::ledger::CartLedger;
use crate::source::CatalogSource;

/// First page and product count as delivered with the server-rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsrSnapshot {
    pub first_page: FetchedPage,
    pub total_products: u64,
}

impl SsrSnapshot {
    /// Fetch page 1 and the count the way a server render would.
    ///
    /// # Errors
    ///
    /// Returns an error if either request fails.
    pub async fn fetch(source: &dyn CatalogSource, per_page: u32) -> Result<Self> {
        let (first_page, total_products) = tokio::try_join!(
            source.fetch_page(per_page, None),
            source.fetch_total_count()
        )?;
        Ok(Self {
            first_page,
            total_products,
        })
    }
}

/// Which state the catalog started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// Page 1 and the count came from the server render.
    ServerRendered,
    /// Pages were restored from persisted metadata.
    Persisted,
    /// Nothing to start from; pages load on demand.
    Empty,
    /// Already hydrated and no server render was given.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationReport {
    pub outcome: HydrationOutcome,
    /// Catalog pages available right after hydration.
    pub pages: usize,
    /// Ledger lines, which hydration preserves as-is.
    pub cart_lines: usize,
}

/// Establishes the starting catalog snapshot.
pub struct HydrationCoordinator {
    catalog: CatalogCache,
    ledger: CartLedger,
    source: Arc<dyn CatalogSource>,
    hydrated: AtomicBool,
}

impl HydrationCoordinator {
    #[must_use]
    pub fn new(catalog: CatalogCache, ledger: CartLedger, source: Arc<dyn CatalogSource>) -> Self {
        Self {
            catalog,
            ledger,
            source,
            hydrated: AtomicBool::new(false),
        }
    }

    /// Whether [`HydrationCoordinator::hydrate`] has run.
    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::SeqCst)
    }

    /// Apply the precedence rules described in the module docs.
    #[instrument(skip_all, fields(server_rendered = ssr.is_some()))]
    pub fn hydrate(&self, ssr: Option<SsrSnapshot>) -> HydrationReport {
        let first_run = !self.hydrated.swap(true, Ordering::SeqCst);

        let (outcome, pages) = match ssr {
            Some(ssr) => {
                let cursor = ssr.first_page.continuation();
                self.catalog.reset_pagination(ssr.first_page.items, cursor);
                self.catalog.set_total_count(ssr.total_products);
                (HydrationOutcome::ServerRendered, 1)
            }
            None if first_run => match self.catalog.restore_persisted() {
                Some(pages) => (HydrationOutcome::Persisted, pages),
                None => (HydrationOutcome::Empty, 0),
            },
            None => (
                HydrationOutcome::Unchanged,
                self.catalog.snapshot().pages.len(),
            ),
        };

        let report = HydrationReport {
            outcome,
            pages,
            cart_lines: self.ledger.snapshot().len(),
        };
        info!(
            outcome = ?report.outcome,
            pages = report.pages,
            cart_lines = report.cart_lines,
            "Hydrated client state"
        );
        report
    }

    /// Fetch a fresh first page from the source and hydrate from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails; state is then left untouched.
    pub async fn hydrate_from_source(&self) -> Result<HydrationReport> {
        let ssr = SsrSnapshot::fetch(self.source.as_ref(), self.catalog.per_page()).await?;
        Ok(self.hydrate(Some(ssr)))
    }
}
