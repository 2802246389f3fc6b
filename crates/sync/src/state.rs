//! Wiring of the components around one source and one store.

use std::sync::Arc;

use tracing::info;

use crate::aggregator::CartAggregator;
use crate::catalog::CatalogCache;
use crate::config::SyncConfig;
use crate::hydration::HydrationCoordinator;
use crate::ledger::CartLedger;
use crate::source::{CatalogSource, GraphqlCatalogSource, SourceError};
use crate::store::{FileStore, StateStore, StoreError};

/// Error creating a [`ShopState`] from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("state store: {0}")]
    Store(#[from] StoreError),
    #[error("catalog client: {0}")]
    Source(#[from] SourceError),
}

/// The four components sharing one catalog source and one state store.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct ShopState {
    inner: Arc<ShopStateInner>,
}

struct ShopStateInner {
    catalog: CatalogCache,
    ledger: CartLedger,
    aggregator: CartAggregator,
    hydration: HydrationCoordinator,
}

impl ShopState {
    /// Build the components over `source` and `store`. The ledger is
    /// restored from `store` immediately; the catalog waits for hydration.
    #[must_use]
    pub fn new(source: Arc<dyn CatalogSource>, store: Arc<dyn StateStore>, per_page: u32) -> Self {
        let ledger = CartLedger::open(Arc::clone(&store));
        let catalog = CatalogCache::new(Arc::clone(&source), store, per_page);
        let aggregator = CartAggregator::new(&ledger, &catalog, Arc::clone(&source));
        let hydration = HydrationCoordinator::new(catalog.clone(), ledger.clone(), source);

        Self {
            inner: Arc::new(ShopStateInner {
                catalog,
                ledger,
                aggregator,
                hydration,
            }),
        }
    }

    /// Connect to the configured GraphQL catalog, persisting under the
    /// configured state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be created or the HTTP
    /// client cannot be built.
    pub fn connect(config: &SyncConfig) -> Result<Self, ConnectError> {
        let store = FileStore::open(&config.state_dir)?;
        info!(dir = %store.dir().display(), "Opened state store");
        let source = GraphqlCatalogSource::new(&config.catalog)?;
        Ok(Self::new(
            Arc::new(source),
            Arc::new(store),
            config.catalog.page_size,
        ))
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.inner.catalog
    }

    #[must_use]
    pub fn ledger(&self) -> &CartLedger {
        &self.inner.ledger
    }

    #[must_use]
    pub fn aggregator(&self) -> &CartAggregator {
        &self.inner.aggregator
    }

    #[must_use]
    pub fn hydration(&self) -> &HydrationCoordinator {
        &self.inner.hydration
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shop_sync_core::ProductId;

    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::FakeSource;

    #[tokio::test]
    async fn test_components_share_store_and_source() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(FakeSource::with_products(25));

        let shop = ShopState::new(source.clone(), store.clone(), 12);
        shop.hydration().hydrate_from_source().await.unwrap();
        shop.ledger().set_quantity(ProductId::new(105), 2).unwrap();

        assert_eq!(shop.aggregator().subtotal(), "20.00".parse().unwrap());

        let reopened = ShopState::new(source, store, 12);
        assert_eq!(reopened.ledger().quantity_of(ProductId::new(105)), 2);
        reopened.hydration().hydrate(None);
        assert_eq!(reopened.catalog().snapshot().pages.len(), 1);
    }
}
