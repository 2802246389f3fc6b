//! Catalog entries.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::{CurrencyCode, Price};

/// Name shown for cart lines whose product could not be resolved.
pub const PLACEHOLDER_NAME: &str = "Unavailable product";

/// A catalog entry as delivered by one fetch.
///
/// Products are never mutated after a fetch; a page is replaced wholesale
/// when it is fetched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Opaque identity assigned by the catalog backend.
    pub id: String,
    /// Stable integer key used by the cart.
    #[serde(rename = "numericId")]
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Fixed-point price.
    pub price: Price,
    /// Category names, ordered as delivered, without duplicates.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Primary image URI.
    #[serde(default, rename = "imageRef")]
    pub image_url: Option<String>,
    /// Pagination token of this entry's position in the listing.
    #[serde(default)]
    pub cursor: Option<String>,
}

impl Product {
    /// The stand-in used when a cart line cannot be resolved: zero price and
    /// a sentinel name, so the line stays renderable.
    #[must_use]
    pub fn placeholder(product_id: ProductId) -> Self {
        Self {
            id: String::new(),
            product_id,
            name: PLACEHOLDER_NAME.to_string(),
            price: Price::zero(CurrencyCode::default()),
            categories: Vec::new(),
            image_url: None,
            cursor: None,
        }
    }

    /// Whether this is the placeholder produced by [`Product::placeholder`].
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.id.is_empty() && self.name == PLACEHOLDER_NAME
    }
}
