//! Cart ledger commands.

use shop_sync::ShopState;
use shop_sync_core::{Price, ProductId, Resolution, round_currency};

use super::CommandError;

/// Add one unit of a product.
pub fn add(shop: &ShopState, product_id: i64) -> Result<(), CommandError> {
    let id = ProductId::new(product_id);
    shop.ledger().increase(id)?;
    tracing::info!(product_id = %id, quantity = shop.ledger().quantity_of(id), "Added to cart");
    Ok(())
}

/// Remove one unit of a product.
pub fn decrease(shop: &ShopState, product_id: i64) -> Result<(), CommandError> {
    let id = ProductId::new(product_id);
    shop.ledger().decrease(id)?;
    tracing::info!(product_id = %id, quantity = shop.ledger().quantity_of(id), "Decreased in cart");
    Ok(())
}

/// Set the quantity of a product.
pub fn set(shop: &ShopState, product_id: i64, quantity: i64) -> Result<(), CommandError> {
    let id = ProductId::new(product_id);
    shop.ledger().set_quantity(id, quantity)?;
    tracing::info!(product_id = %id, quantity = shop.ledger().quantity_of(id), "Quantity set");
    Ok(())
}

/// Remove a product from the cart.
pub fn remove(shop: &ShopState, product_id: i64) -> Result<(), CommandError> {
    let id = ProductId::new(product_id);
    shop.ledger().remove(id)?;
    tracing::info!(product_id = %id, "Removed from cart");
    Ok(())
}

/// Empty the cart.
pub fn clear(shop: &ShopState) -> Result<(), CommandError> {
    shop.ledger().clear()?;
    tracing::info!("Cart cleared");
    Ok(())
}

/// Print priced cart lines, resolving products the cached pages lack.
pub async fn show(shop: &ShopState) {
    shop.hydration().hydrate(None);
    shop.aggregator().resolve_missing().await;
    let view = shop.aggregator().view();

    #[allow(clippy::print_stdout)]
    {
        if view.is_empty() {
            println!("Cart is empty");
            return;
        }

        for detail in &view.lines {
            let line_total = Price::new(
                round_currency(detail.line_total()),
                detail.product.price.currency_code,
            );
            let marker = match detail.resolution {
                Resolution::Catalog | Resolution::Lookup => "",
                Resolution::Pending | Resolution::Placeholder => " (unavailable)",
            };
            println!(
                "  {:>3} x {:<40} {:>10} {:>10}{marker}",
                detail.line.quantity, detail.product.name, detail.product.price, line_total
            );
        }
        for warning in &view.warnings {
            println!("  ! {warning}");
        }
        println!("{} items, subtotal {}", view.item_count, view.formatted_subtotal());
    }
}
