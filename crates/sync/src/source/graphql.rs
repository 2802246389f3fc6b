//! GraphQL catalog source implementation.
//!
//! Uses `graphql_client` for type-safe queries with `reqwest` 0.13 for HTTP.
//! Single-product lookups are cached using `moka`.

use std::sync::Arc;

use async_trait::async_trait;
use graphql_client::{GraphQLQuery, Response};
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use shop_sync_core::{FetchedPage, Product, ProductId};
use tracing::{debug, instrument};
use url::Url;

use super::conversions::{
    convert_product_connection, convert_product_lookup, convert_total_count,
};
use super::queries::{
    GetAllPublishedProducts, GetProductById, GetTotalProducts, get_all_published_products,
    get_product_by_id, get_total_products,
};
use super::{CatalogSource, SourceError};
use crate::config::CatalogConfig;

/// Maximum number of characters of a response body kept in logs and errors.
const BODY_PREVIEW_CHARS: usize = 500;

// =============================================================================
// GraphqlCatalogSource
// =============================================================================

/// Client for a WPGraphQL / WooCommerce product catalog.
///
/// Cheap to clone; clones share the HTTP connection pool and lookup cache.
#[derive(Clone)]
pub struct GraphqlCatalogSource {
    inner: Arc<GraphqlCatalogSourceInner>,
}

struct GraphqlCatalogSourceInner {
    client: reqwest::Client,
    endpoint: Url,
    auth_token: Option<SecretString>,
    lookups: Cache<ProductId, Option<Product>>,
}

impl GraphqlCatalogSource {
    /// Create a new catalog client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &CatalogConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let lookups = Cache::builder()
            .max_capacity(1000)
            .time_to_live(config.lookup_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(GraphqlCatalogSourceInner {
                client,
                endpoint: config.endpoint.clone(),
                auth_token: config.auth_token.clone(),
                lookups,
            }),
        })
    }

    /// Execute a GraphQL query and return its `data`.
    async fn execute<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
    ) -> Result<Q::ResponseData, SourceError>
    where
        Q::Variables: serde::Serialize,
    {
        let body = Q::build_query(variables);
        let operation_name = body.operation_name;

        let mut request = self
            .inner
            .client
            .post(self.inner.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(token) = &self.inner.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(SourceError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;
        let preview: String = response_text.chars().take(BODY_PREVIEW_CHARS).collect();

        if !status.is_success() {
            tracing::error!(
                status = %status,
                operation = operation_name,
                body = %preview,
                "Catalog endpoint returned non-success status"
            );
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        let response: Response<Q::ResponseData> = serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                operation = operation_name,
                body = %preview,
                "Failed to parse catalog GraphQL response"
            );
            SourceError::Parse(e)
        })?;

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            debug!(errors = ?errors, "GraphQL errors in response");
            return Err(SourceError::GraphQL(
                errors.into_iter().map(|e| e.message).collect(),
            ));
        }

        response.data.ok_or_else(|| {
            tracing::error!(
                operation = operation_name,
                body = %preview,
                "Catalog GraphQL response has no data and no errors"
            );
            SourceError::Data("no data in response".to_string())
        })
    }
}

#[async_trait]
impl CatalogSource for GraphqlCatalogSource {
    #[instrument(skip(self))]
    async fn fetch_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<FetchedPage, SourceError> {
        let variables = get_all_published_products::Variables {
            first: i64::from(page_size),
            after: cursor.map(str::to_string),
        };

        let data = self.execute::<GetAllPublishedProducts>(variables).await?;

        let page = convert_product_connection(data.products)?;
        debug!(
            items = page.items.len(),
            has_next_page = page.has_next_page,
            "Fetched catalog page"
        );
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn fetch_total_count(&self) -> Result<u64, SourceError> {
        let data = self
            .execute::<GetTotalProducts>(get_total_products::Variables)
            .await?;

        convert_total_count(data)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn fetch_product_by_id(&self, id: ProductId) -> Result<Option<Product>, SourceError> {
        // Check cache
        if let Some(cached) = self.inner.lookups.get(&id).await {
            debug!("Cache hit for product lookup");
            return Ok(cached);
        }

        let variables = get_product_by_id::Variables { id: id.to_string() };

        let data = self.execute::<GetProductById>(variables).await?;
        let product = convert_product_lookup(data)?;

        // Cache the result, including "not found"
        self.inner.lookups.insert(id, product.clone()).await;

        Ok(product)
    }
}
