//! Shop Sync - client-side state synchronization for a paginated catalog and
//! a persisted cart.
//!
//! # Components
//!
//! - [`catalog::CatalogCache`] - page-indexed product cache and the forward-only
//!   cursor chain needed to reach further pages
//! - [`ledger::CartLedger`] - the persisted `(product, quantity)` record
//! - [`aggregator::CartAggregator`] - priced line details and subtotal derived
//!   from the ledger and the catalog
//! - [`hydration::HydrationCoordinator`] - reconciles server-rendered first-page
//!   data with previously persisted client state at startup
//!
//! Dependencies only point one way: the aggregator reads the ledger and the
//! catalog through their subscriptions; neither of those knows about the
//! aggregator or about each other.
//!
//! # Example
//!
//! ```rust,ignore
//! use shop_sync::{ShopState, SyncConfig};
//!
//! let config = SyncConfig::from_env()?;
//! let shop = ShopState::connect(&config)?;
//!
//! shop.hydration().hydrate_from_source().await?;
//! shop.ledger().increase(ProductId::new(101))?;
//! shop.catalog().go_to_page(2).await?;
//!
//! let view = shop.aggregator().view();
//! println!("subtotal: {}", view.subtotal);
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hydration;
pub mod ledger;
pub mod source;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

pub use aggregator::{CartAggregator, CartView};
pub use catalog::{CatalogCache, CatalogSnapshot, Navigation, PaginationMetadata};
pub use config::{CatalogConfig, ConfigError, SyncConfig};
pub use error::{Result, SyncError};
pub use hydration::{HydrationCoordinator, HydrationOutcome, HydrationReport, SsrSnapshot};
pub use ledger::{CartLedger, LedgerState};
pub use source::{CatalogSource, GraphqlCatalogSource, SourceError};
pub use state::{ConnectError, ShopState};
pub use store::{FileStore, MemoryStore, Namespace, StateStore, StoreError};
