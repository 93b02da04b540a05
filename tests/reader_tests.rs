mod common;

use agency_site::{
    ContentQuery, CrudHandle, MemoryBackend, QueryCache,
    error::HookErrorKind,
    models::{ContactSubmission, PortfolioItem, Table},
    reader::Records,
    repository::QueryOptions,
};
use common::{seed_portfolio, store_of};
use std::time::Duration;

fn query(backend: &MemoryBackend, options: QueryOptions) -> ContentQuery<PortfolioItem> {
    ContentQuery::new(store_of(backend), None, options)
}

fn slugs(records: Records<PortfolioItem>) -> Vec<String> {
    records.into_list().into_iter().map(|item| item.slug).collect()
}

#[tokio::test]
async fn test_starts_loading_with_empty_data() {
    let backend = MemoryBackend::new();
    let list = query(&backend, QueryOptions::new()).state();
    assert!(list.loading);
    assert_eq!(list.data, Records::List(vec![]));

    let single = query(&backend, QueryOptions::new().single()).state();
    assert_eq!(single.data, Records::Single(None));
    assert_eq!(backend.read_count(), 0);
}

#[tokio::test]
async fn test_only_published_rows_are_returned() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "draft", "Web", false).await;
    seed_portfolio(&backend, "live-one", "Web", true).await;
    seed_portfolio(&backend, "live-two", "Branding", true).await;

    let q = query(&backend, QueryOptions::new());
    q.mount().await;

    let state = q.state();
    assert!(!state.loading);
    assert!(state.error.is_none());
    // Newest first by default.
    assert_eq!(slugs(state.data), vec!["live-two", "live-one"]);
    assert_eq!(backend.read_count(), 1);
}

#[tokio::test]
async fn test_caller_filters_combine_with_published() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "web-draft", "Web", false).await;
    seed_portfolio(&backend, "web-live", "Web", true).await;
    seed_portfolio(&backend, "brand-live", "Branding", true).await;

    let q = query(&backend, QueryOptions::new().eq("category", "Web"));
    q.mount().await;

    assert_eq!(slugs(q.state().data), vec!["web-live"]);
}

#[tokio::test]
async fn test_order_and_limit() {
    let backend = MemoryBackend::new();
    for slug in ["a", "b", "c"] {
        seed_portfolio(&backend, slug, "Web", true).await;
    }

    let q = query(&backend, QueryOptions::new().order("created_at", true).limit(2));
    q.mount().await;

    assert_eq!(slugs(q.state().data), vec!["a", "b"]);
}

#[tokio::test]
async fn test_missing_slug_settles_with_error_and_no_data() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "exists", "Web", true).await;

    let q = query(&backend, QueryOptions::new().eq("slug", "missing").single());
    q.mount().await;

    let state = q.state();
    assert_eq!(state.data, Records::Single(None));
    assert!(!state.loading);
    let err = state.error.expect("not-found error");
    assert_eq!(err.kind, HookErrorKind::NotFound);
    assert!(!err.message.is_empty());
}

#[tokio::test]
async fn test_unpublished_slug_is_not_found() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "hidden", "Web", false).await;

    let q = query(&backend, QueryOptions::new().eq("slug", "hidden").single());
    q.mount().await;

    assert!(q.state().error.is_some_and(|e| e.is_not_found()));
}

#[tokio::test]
async fn test_single_with_several_matches_fails() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "one", "Web", true).await;
    seed_portfolio(&backend, "two", "Web", true).await;

    let q = query(&backend, QueryOptions::new().eq("category", "Web").single());
    q.mount().await;

    let err = q.state().error.expect("multiple rows error");
    assert_eq!(err.kind, HookErrorKind::Backend);
}

#[tokio::test]
async fn test_failure_keeps_previous_data() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "kept", "Web", true).await;

    let q = query(&backend, QueryOptions::new());
    q.mount().await;
    assert_eq!(q.state().data.len(), 1);

    backend.fail_next("connection reset").await;
    q.refetch().await;

    let state = q.state();
    assert!(!state.loading);
    assert_eq!(state.error_message(), Some("connection reset"));
    assert_eq!(slugs(state.data), vec!["kept"]);

    // A successful read clears the error again.
    q.refetch().await;
    assert!(q.state().error.is_none());
}

#[tokio::test]
async fn test_subscribers_see_settled_state() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "watched", "Web", true).await;

    let q = query(&backend, QueryOptions::new());
    let mut rx = q.subscribe();
    q.mount().await;

    assert!(rx.has_changed().unwrap());
    let state = rx.borrow_and_update().clone();
    assert!(!state.loading);
    assert_eq!(state.data.len(), 1);
}

#[tokio::test]
async fn test_stale_response_is_discarded() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "first", "Web", true).await;

    let q = query(&backend, QueryOptions::new());
    q.mount().await;

    // The first refetch is slow and sees only "first"; the second is fast and
    // also sees "second". The slow one lands last and must not win.
    backend
        .delay_next_reads([Duration::from_millis(200), Duration::ZERO])
        .await;
    let slow = tokio::spawn({
        let q = q.clone();
        async move { q.refetch().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    seed_portfolio(&backend, "second", "Web", true).await;
    q.refetch().await;
    assert_eq!(slugs(q.state().data), vec!["second", "first"]);

    slow.await.unwrap();
    let state = q.state();
    assert_eq!(slugs(state.data), vec!["second", "first"]);
    assert!(!state.loading);
    assert_eq!(backend.read_count(), 3);
}

#[tokio::test]
async fn test_no_commit_after_unmount() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "before", "Web", true).await;

    let q = query(&backend, QueryOptions::new());
    q.mount().await;

    backend.delay_next_reads([Duration::from_millis(100)]).await;
    seed_portfolio(&backend, "after", "Web", true).await;
    let in_flight = tokio::spawn({
        let q = q.clone();
        async move { q.refetch().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    q.unmount();
    in_flight.await.unwrap();

    assert_eq!(slugs(q.state().data), vec!["before"]);

    // Further refetches are ignored entirely.
    let reads = backend.read_count();
    q.refetch().await;
    assert_eq!(backend.read_count(), reads);
}

#[tokio::test]
async fn test_contact_submissions_have_no_public_read() {
    let backend = MemoryBackend::new();
    let q: ContentQuery<ContactSubmission> = ContentQuery::new(store_of(&backend), None, QueryOptions::new());
    q.mount().await;

    let state = q.state();
    assert!(!state.loading);
    assert_eq!(state.error.map(|e| e.kind), Some(HookErrorKind::NotFound));
    assert_eq!(backend.read_count(), 0);
}

#[tokio::test]
async fn test_table_change_triggers_a_read() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "p", "Web", true).await;

    let q = query(&backend, QueryOptions::new());
    q.mount().await;
    assert_eq!(backend.read_count(), 1);

    q.set_table(Table::ContactSubmissions).await;
    assert_eq!(q.table(), Table::ContactSubmissions);
    assert!(q.state().error.is_some());

    q.set_table(Table::Portfolios).await;
    assert_eq!(backend.read_count(), 2);
    assert!(q.state().error.is_none());
}

#[tokio::test]
async fn test_table_of_another_record_type_is_refused() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "kept", "Web", true).await;
    common::seed_service(&backend, "seo", true).await;

    let q = query(&backend, QueryOptions::new());
    q.mount().await;

    // Service rows would otherwise decode into blank portfolio items.
    q.set_table(Table::Services).await;
    let state = q.state();
    assert_eq!(state.error.map(|e| e.kind), Some(HookErrorKind::Validation));
    assert_eq!(slugs(state.data), vec!["kept"]);
    assert_eq!(backend.read_count(), 1);
}

#[tokio::test]
async fn test_cache_serves_mounts_and_refetch_bypasses_it() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "cached", "Web", true).await;
    let cache = QueryCache::new(Duration::from_secs(60), 100);

    let first = ContentQuery::<PortfolioItem>::new(store_of(&backend), Some(cache.clone()), QueryOptions::new());
    first.mount().await;
    let second = ContentQuery::<PortfolioItem>::new(store_of(&backend), Some(cache.clone()), QueryOptions::new());
    second.mount().await;
    assert_eq!(backend.read_count(), 1);
    assert_eq!(second.state().data.len(), 1);

    second.refetch().await;
    assert_eq!(backend.read_count(), 2);
}

#[tokio::test]
async fn test_admin_write_invalidates_cached_reads() {
    let backend = MemoryBackend::new();
    let draft = seed_portfolio(&backend, "soon-live", "Web", false).await;
    let cache = QueryCache::new(Duration::from_secs(60), 100);

    let before = ContentQuery::<PortfolioItem>::new(store_of(&backend), Some(cache.clone()), QueryOptions::new());
    before.mount().await;
    assert!(before.state().data.is_empty());

    let crud = CrudHandle::<PortfolioItem>::new(store_of(&backend), Some(cache.clone()));
    crud.toggle_published(draft.id, false).await.unwrap();

    let after = ContentQuery::<PortfolioItem>::new(store_of(&backend), Some(cache), QueryOptions::new());
    after.mount().await;
    assert_eq!(slugs(after.state().data), vec!["soon-live"]);
    assert_eq!(backend.read_count(), 2);
}

#[tokio::test]
async fn test_read_in_flight_during_publish_is_not_cached() {
    let backend = MemoryBackend::new();
    let draft = seed_portfolio(&backend, "racing", "Web", false).await;
    let cache = QueryCache::new(Duration::from_secs(60), 100);

    // A slow public read picks up the rows from before the publish.
    backend.delay_next_reads([Duration::from_millis(200)]).await;
    let slow = tokio::spawn({
        let q = ContentQuery::<PortfolioItem>::new(store_of(&backend), Some(cache.clone()), QueryOptions::new());
        async move {
            q.mount().await;
            q.state()
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let crud = CrudHandle::<PortfolioItem>::new(store_of(&backend), Some(cache.clone()));
    crud.toggle_published(draft.id, false).await.unwrap();

    assert!(slow.await.unwrap().data.is_empty());

    let fresh = ContentQuery::<PortfolioItem>::new(store_of(&backend), Some(cache), QueryOptions::new());
    fresh.mount().await;
    assert_eq!(slugs(fresh.state().data), vec!["racing"]);
}

#[tokio::test]
async fn test_unpublished_row_leaves_cached_reads() {
    let backend = MemoryBackend::new();
    let live = seed_portfolio(&backend, "going-away", "Web", true).await;
    let cache = QueryCache::new(Duration::from_secs(60), 100);

    let before = ContentQuery::<PortfolioItem>::new(store_of(&backend), Some(cache.clone()), QueryOptions::new());
    before.mount().await;
    assert_eq!(before.state().data.len(), 1);

    CrudHandle::<PortfolioItem>::new(store_of(&backend), Some(cache.clone()))
        .toggle_published(live.id, true)
        .await
        .unwrap();

    let after = ContentQuery::<PortfolioItem>::new(store_of(&backend), Some(cache), QueryOptions::new());
    after.mount().await;
    assert!(after.state().data.is_empty());
}
