//! Catalog data source.
//!
//! # Architecture
//!
//! - [`CatalogSource`] is the boundary the components depend on; the catalog
//!   backend is the source of truth and is only ever read.
//! - [`GraphqlCatalogSource`] talks to a WPGraphQL / WooCommerce endpoint with
//!   `reqwest`, using queries generated by `graphql_client` from
//!   `graphql/catalog/`.
//! - Single-product lookups are memoised via `moka` (TTL from configuration).

mod conversions;
mod graphql;
mod queries;

pub use graphql::GraphqlCatalogSource;

use async_trait::async_trait;
use shop_sync_core::{FetchedPage, Product, ProductId};
use thiserror::Error;

/// Errors that can occur when reading from the catalog source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Rate limited by the endpoint.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<String>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The response parsed but lacks expected fields.
    #[error("Invalid response: {0}")]
    Data(String),
}

impl SourceError {
    /// Transport failures (retryable as-is) as opposed to malformed data.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Status { .. } | Self::RateLimited(_) | Self::GraphQL(_)
        )
    }
}

fn format_graphql_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        return "(no error details provided)".to_string();
    }
    errors.join("; ")
}

/// Read access to the remote product catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch `page_size` products following `cursor` (`None` for the first page).
    async fn fetch_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<FetchedPage, SourceError>;

    /// Total number of published products.
    async fn fetch_total_count(&self) -> Result<u64, SourceError>;

    /// A single product by its numeric key; `Ok(None)` if it does not exist.
    async fn fetch_product_by_id(&self, id: ProductId) -> Result<Option<Product>, SourceError>;
}
