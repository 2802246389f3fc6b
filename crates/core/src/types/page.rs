//! Cursor-paginated catalog pages.

use serde::{Deserialize, Serialize};

use super::product::Product;

/// One page as returned by the catalog source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedPage {
    pub items: Vec<Product>,
    pub has_next_page: bool,
    pub next_cursor: Option<String>,
}

impl FetchedPage {
    /// Cursor needed to fetch the page after this one.
    ///
    /// `None` when the source reports no further pages. If the source claims a
    /// next page but omits the end cursor, the trailing item's own cursor is
    /// used instead.
    #[must_use]
    pub fn continuation(&self) -> Option<String> {
        if !self.has_next_page {
            return None;
        }
        self.next_cursor
            .clone()
            .or_else(|| self.items.last().and_then(|p| p.cursor.clone()))
    }
}

/// `ceil(total_products / per_page)`, saturating at `u32::MAX`.
///
/// A `per_page` of zero yields zero pages.
#[must_use]
pub fn total_pages(total_products: u64, per_page: u32) -> u32 {
    if per_page == 0 {
        return 0;
    }
    u32::try_from(total_products.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX)
}
