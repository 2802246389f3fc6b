//! Configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CATALOG_GRAPHQL_URL` - GraphQL endpoint serving the product catalog
//!
//! ## Optional
//! - `CATALOG_AUTH_TOKEN` - Bearer token sent with catalog requests
//! - `CATALOG_PAGE_SIZE` - Products per page (default: 12)
//! - `CATALOG_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `CATALOG_LOOKUP_TTL_SECS` - Lifetime of memoised single-product lookups (default: 300)
//! - `SHOP_SYNC_STATE_DIR` - Directory holding persisted state (default: .shop-sync)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_PAGE_SIZE: &str = "12";
const DEFAULT_TIMEOUT_SECS: &str = "10";
const DEFAULT_LOOKUP_TTL_SECS: &str = "300";
const DEFAULT_STATE_DIR: &str = ".shop-sync";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Synchronization layer configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Catalog source configuration
    pub catalog: CatalogConfig,
    /// Directory used by the file-backed state store
    pub state_dir: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., production, staging)
    pub sentry_environment: Option<String>,
}

/// Catalog source configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct CatalogConfig {
    /// GraphQL endpoint URL
    pub endpoint: Url,
    /// Optional bearer token
    pub auth_token: Option<SecretString>,
    /// Products per page
    pub page_size: u32,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// How long single-product lookups stay memoised
    pub lookup_ttl: Duration,
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("page_size", &self.page_size)
            .field("request_timeout", &self.request_timeout)
            .field("lookup_ttl", &self.lookup_ttl)
            .finish()
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let catalog = CatalogConfig::from_env()?;
        let state_dir = PathBuf::from(get_env_or_default("SHOP_SYNC_STATE_DIR", DEFAULT_STATE_DIR));

        Ok(Self {
            catalog,
            state_dir,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

impl CatalogConfig {
    /// Build a configuration for `endpoint` with default tuning.
    #[must_use]
    pub const fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            auth_token: None,
            page_size: 12,
            request_timeout: Duration::from_secs(10),
            lookup_ttl: Duration::from_secs(300),
        }
    }

    fn from_env() -> Result<Self, ConfigError> {
        let endpoint = parse_endpoint(&get_required_env("CATALOG_GRAPHQL_URL")?)?;

        let page_size = parse_env::<u32>("CATALOG_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CATALOG_PAGE_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let request_timeout = Duration::from_secs(parse_env::<u64>(
            "CATALOG_REQUEST_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?);
        let lookup_ttl = Duration::from_secs(parse_env::<u64>(
            "CATALOG_LOOKUP_TTL_SECS",
            DEFAULT_LOOKUP_TTL_SECS,
        )?);

        Ok(Self {
            endpoint,
            auth_token: get_optional_env("CATALOG_AUTH_TOKEN").map(SecretString::from),
            page_size,
            request_timeout,
            lookup_ttl,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse the catalog endpoint, accepting only http(s) URLs.
fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar("CATALOG_GRAPHQL_URL".to_string(), e.to_string()))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidEnvVar(
            "CATALOG_GRAPHQL_URL".to_string(),
            format!("unsupported scheme: {other}"),
        )),
    }
}
