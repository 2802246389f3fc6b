//! Catalog navigation commands.
//!
//! Every command starts from the persisted pagination state, so `page`,
//! `next` and `prev` continue from where the previous invocation stopped.

use shop_sync::{CatalogSnapshot, HydrationReport, Navigation, ShopState, SyncError};

use super::CommandError;

/// Replace page 1 and the count with fresh data from the catalog.
pub async fn hydrate(shop: &ShopState) -> Result<(), CommandError> {
    let report = shop.hydration().hydrate_from_source().await?;
    print_report(&report);
    print_page(&shop.catalog().snapshot());
    Ok(())
}

/// Show `page`, walking the cursor chain as needed.
pub async fn page(shop: &ShopState, page: u32) -> Result<(), CommandError> {
    prepare(shop).await?;
    let navigation = shop.catalog().go_to_page(page).await?;
    finish(shop, &navigation);
    Ok(())
}

/// Show the page after the current one.
pub async fn next(shop: &ShopState) -> Result<(), CommandError> {
    prepare(shop).await?;
    match shop.catalog().next_page().await? {
        Some(navigation) => finish(shop, &navigation),
        None => tracing::info!("Already on the last page"),
    }
    Ok(())
}

/// Show the page before the current one.
pub async fn prev(shop: &ShopState) -> Result<(), CommandError> {
    prepare(shop).await?;
    match shop.catalog().prev_page().await? {
        Some(navigation) => finish(shop, &navigation),
        None => tracing::info!("Already on the first page"),
    }
    Ok(())
}

/// Fetch and print the product count.
pub async fn count(shop: &ShopState) -> Result<(), CommandError> {
    shop.hydration().hydrate(None);
    let total = shop.catalog().refresh_total_count().await?;
    let snapshot = shop.catalog().snapshot();

    #[allow(clippy::print_stdout)]
    {
        println!(
            "{total} products, {} pages of {}",
            snapshot.total_pages.unwrap_or(0),
            snapshot.per_page
        );
    }
    Ok(())
}

/// Restore persisted state and make sure the catalog extent is known.
async fn prepare(shop: &ShopState) -> Result<(), SyncError> {
    let report = shop.hydration().hydrate(None);
    tracing::debug!(outcome = ?report.outcome, pages = report.pages, "Catalog state loaded");

    if shop.catalog().snapshot().total_products.is_none() {
        shop.catalog().refresh_total_count().await?;
    }
    Ok(())
}

fn finish(shop: &ShopState, navigation: &Navigation) {
    if !navigation.is_applied() {
        tracing::warn!(page = navigation.page(), "Navigation was superseded");
    }
    print_page(&shop.catalog().snapshot());
}

#[allow(clippy::print_stdout)]
fn print_report(report: &HydrationReport) {
    println!(
        "Hydrated: {:?} ({} pages cached, {} cart lines kept)",
        report.outcome, report.pages, report.cart_lines
    );
}

#[allow(clippy::print_stdout)]
fn print_page(snapshot: &CatalogSnapshot) {
    let of = snapshot
        .total_pages
        .map_or_else(|| "?".to_string(), |pages| pages.to_string());
    println!("Page {} of {of}", snapshot.current_page);

    for product in snapshot.current_items() {
        println!(
            "  {:>8}  {:<40} {:>10}",
            product.product_id, product.name, product.price
        );
    }
}
