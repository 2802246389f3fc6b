//! Cart lines and their catalog-enriched details.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::product::Product;

/// One product's quantity in the cart.
///
/// The ledger guarantees `quantity >= 1`; a line whose quantity would reach
/// zero is removed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartLine {
    #[must_use]
    pub const fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Where a line detail's product came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Found on a loaded catalog page.
    Catalog,
    /// Found by a single-item lookup.
    Lookup,
    /// A lookup is still outstanding; the placeholder is shown meanwhile.
    Pending,
    /// Neither the catalog nor a lookup produced the product.
    Placeholder,
}

/// A cart line joined with its resolved product (or the placeholder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineDetail {
    pub line: CartLine,
    pub product: Product,
    pub resolution: Resolution,
}

impl CartLineDetail {
    /// Unrounded `price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price.times(self.line.quantity)
    }

    /// Whether the line is backed by real product data.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self.resolution, Resolution::Catalog | Resolution::Lookup)
    }
}

/// A cart line whose product could not be resolved.
///
/// Non-fatal: the line is kept and priced at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionWarning {
    pub product_id: ProductId,
    pub reason: String,
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "product {} could not be resolved: {}",
            self.product_id, self.reason
        )
    }
}
