//! Integration tests for catalog pagination.
//!
//! Covers the cursor chain, in-flight coalescing, stale responses and the
//! guarantee that failed fetches leave the shown page untouched.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use shop_sync::{Navigation, SyncError};
use shop_sync_core::ProductId;
use shop_sync_integration_tests::{Failure, ScriptedSource, TestContext, product};

// =============================================================================
// Range and Sequence Tests
// =============================================================================

#[tokio::test]
async fn test_page_beyond_total_is_rejected() {
    let ctx = TestContext::new(ScriptedSource::with_products(25), 12);
    let shop = ctx.shop();
    shop.catalog().load_page(1).await.unwrap();
    shop.catalog().set_total_count(25);

    assert_eq!(shop.catalog().snapshot().total_pages, Some(3));

    let err = shop.catalog().go_to_page(4).await.unwrap_err();
    assert!(matches!(err, SyncError::PageOutOfRange { page: 4, .. }));
    assert_eq!(shop.catalog().current_page(), 1);
    assert_eq!(ctx.source.calls_for(4), 0);
}

#[tokio::test]
async fn test_page_two_before_page_one_is_sequence_gap() {
    let ctx = TestContext::new(ScriptedSource::with_products(25), 12);
    let shop = ctx.shop();

    let err = shop.catalog().load_page(2).await.unwrap_err();
    assert!(matches!(err, SyncError::SequenceGap { page: 2 }));
    assert!(shop.catalog().snapshot().page(2).is_none());
    assert_eq!(ctx.source.total_page_calls(), 0);
}

#[tokio::test]
async fn test_load_page_requires_previous_page_in_session() {
    let ctx = TestContext::new(ScriptedSource::with_products(40), 10);
    let shop = ctx.shop();

    for page in 2..=4 {
        assert!(shop.catalog().load_page(page).await.is_err());
    }

    for page in 1..=4 {
        let nav = shop.catalog().load_page(page).await.unwrap();
        assert!(nav.is_applied());
    }
    assert_eq!(shop.catalog().current_page(), 4);

    // A reset starts a new chain: page 3 is unreachable until 2 is walked again.
    shop.catalog()
        .reset_pagination(vec![product(101, "10.00")], Some("cursor-10".to_string()));
    assert!(matches!(
        shop.catalog().load_page(3).await,
        Err(SyncError::SequenceGap { page: 3 })
    ));
    shop.catalog().load_page(2).await.unwrap();
    shop.catalog().load_page(3).await.unwrap();
}

#[tokio::test]
async fn test_jump_walks_forward_one_page_at_a_time() {
    let ctx = TestContext::new(ScriptedSource::with_products(50), 10);
    let shop = ctx.shop();

    let nav = shop.catalog().go_to_page(4).await.unwrap();
    assert_eq!(nav.page(), 4);
    for page in 1..=4 {
        assert_eq!(ctx.source.calls_for(page), 1);
    }
    assert_eq!(ctx.source.calls_for(5), 0);

    // Backward navigation is served from the cache.
    shop.catalog().go_to_page(2).await.unwrap();
    shop.catalog().go_to_page(1).await.unwrap();
    assert_eq!(ctx.source.total_page_calls(), 4);

    // Forward again only fetches past the frontier.
    shop.catalog().go_to_page(5).await.unwrap();
    assert_eq!(ctx.source.total_page_calls(), 5);
}

#[tokio::test]
async fn test_next_page_stops_at_the_end() {
    let ctx = TestContext::new(ScriptedSource::with_products(15), 10);
    let shop = ctx.shop();
    shop.hydration().hydrate_from_source().await.unwrap();

    assert!(shop.catalog().next_page().await.unwrap().is_some());
    assert_eq!(shop.catalog().next_page().await.unwrap(), None);
    assert_eq!(shop.catalog().current_items().len(), 5);
}

// =============================================================================
// Coalescing and Ordering Tests
// =============================================================================

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch() {
    let ctx = TestContext::new(ScriptedSource::with_products(25), 12);
    ctx.source.delay_page(1, Duration::from_millis(50));
    let shop = ctx.shop();
    let other = shop.catalog().clone();

    let (a, b, c) = tokio::join!(
        shop.catalog().get_page(1),
        other.get_page(1),
        shop.catalog().get_page(1)
    );
    assert_eq!(a.unwrap().len(), 12);
    assert_eq!(b.unwrap().len(), 12);
    assert_eq!(c.unwrap().len(), 12);
    assert_eq!(ctx.source.calls_for(1), 1);
}

#[tokio::test]
async fn test_slow_response_does_not_clobber_reset() {
    let ctx = TestContext::new(ScriptedSource::with_products(25), 12);
    ctx.source.delay_page(1, Duration::from_millis(100));
    let shop = ctx.shop();

    let slow = {
        let catalog = shop.catalog().clone();
        tokio::spawn(async move { catalog.load_page(1).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let seeded = vec![product(900, "1.00")];
    shop.catalog().reset_pagination(seeded.clone(), None);

    let result = slow.await.unwrap();
    assert!(matches!(result, Err(SyncError::Superseded { page: 1 })));
    assert_eq!(shop.catalog().current_items(), seeded);
}

#[tokio::test]
async fn test_latest_navigation_decides_current_page() {
    let ctx = TestContext::new(ScriptedSource::with_products(36), 12);
    let shop = ctx.shop();
    shop.catalog().go_to_page(2).await.unwrap();
    ctx.source.delay_page(3, Duration::from_millis(80));

    let slow = {
        let catalog = shop.catalog().clone();
        tokio::spawn(async move { catalog.go_to_page(3).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    shop.catalog().go_to_page(1).await.unwrap();

    assert_eq!(slow.await.unwrap().unwrap(), Navigation::Superseded { page: 3 });
    assert_eq!(shop.catalog().current_page(), 1);

    // The slow page is still cached for later.
    shop.catalog().go_to_page(3).await.unwrap();
    assert_eq!(ctx.source.calls_for(3), 1);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_transport_failure_keeps_previous_page() {
    let ctx = TestContext::new(ScriptedSource::with_products(25), 12);
    let shop = ctx.shop();
    shop.catalog().go_to_page(1).await.unwrap();
    let shown = shop.catalog().current_items();

    ctx.source.fail_next(Failure::Status(503));
    let err = shop.catalog().go_to_page(2).await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(shop.catalog().current_page(), 1);
    assert_eq!(shop.catalog().current_items(), shown);
    assert!(!shop.catalog().snapshot().is_loading());

    ctx.source.fail_next(Failure::RateLimited);
    assert!(shop.catalog().go_to_page(2).await.unwrap_err().is_transport());

    // Retrying is safe.
    let nav = shop.catalog().go_to_page(2).await.unwrap();
    assert_eq!(nav.items().unwrap()[0].product_id, ProductId::new(113));
}

#[tokio::test]
async fn test_malformed_response_commits_nothing() {
    let ctx = TestContext::new(ScriptedSource::with_products(25), 12);
    let shop = ctx.shop();
    shop.catalog().load_page(1).await.unwrap();
    let before = shop.catalog().snapshot();

    ctx.source.fail_next(Failure::Malformed);
    let err = shop.catalog().load_page(2).await.unwrap_err();
    assert!(matches!(err, SyncError::Data(_)));
    assert_eq!(shop.catalog().snapshot(), before);
}
