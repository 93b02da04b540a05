mod common;

use agency_site::{
    Content, CrudHandle, MemoryBackend,
    error::{BackendError, HookErrorKind, ValidationError},
    models::{
        ContactSubmission, NewContactSubmission, NewPortfolioItem, PortfolioItem,
        PortfolioItemPatch, Table,
    },
    repository::QueryOptions,
};
use common::{seed_portfolio, store_of};
use std::time::Duration;
use uuid::Uuid;

fn portfolios(backend: &MemoryBackend) -> CrudHandle<PortfolioItem> {
    CrudHandle::new(store_of(backend), None)
}

fn new_item(title: &str) -> NewPortfolioItem {
    NewPortfolioItem {
        title: title.to_string(),
        category: "Web".to_string(),
        client: "Acme".to_string(),
        year: "2024".to_string(),
        tags: vec!["ux".to_string(), "react".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_assigns_server_fields() {
    let backend = MemoryBackend::new();
    let crud = portfolios(&backend);

    let created = crud.create(new_item("Test Project")).await.unwrap();

    assert_ne!(created.id, Uuid::nil());
    assert_eq!(created.slug, "test-project");
    assert!(!created.published);
    assert_eq!(created.tags, vec!["ux", "react"]);

    let state = crud.state();
    assert!(!state.loading);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_validation_runs_before_the_backend() {
    let backend = MemoryBackend::new();
    let crud = portfolios(&backend);

    let err = crud.create(new_item("   ")).await.unwrap_err();
    assert!(matches!(err, BackendError::Validation(ValidationError::Required("title"))));

    let bad_slug = NewPortfolioItem {
        slug: Some("Not Safe!".to_string()),
        ..new_item("Fine title")
    };
    let err = crud.create(bad_slug).await.unwrap_err();
    assert!(matches!(err, BackendError::Validation(ValidationError::InvalidSlug(_))));

    assert!(backend.rows(Table::Portfolios).await.is_empty());
    assert_eq!(crud.state().error.map(|e| e.kind), Some(HookErrorKind::Validation));
}

#[tokio::test]
async fn test_duplicate_slug_surfaces_backend_message() {
    let backend = MemoryBackend::new();
    let crud = portfolios(&backend);
    crud.create(new_item("Same")).await.unwrap();

    let err = crud.create(new_item("Same")).await.unwrap_err();
    assert!(matches!(err, BackendError::Api { status: 409, .. }));
    assert!(crud.state().error.unwrap().message.contains("duplicate key"));
}

#[tokio::test]
async fn test_get_all_includes_unpublished_newest_first() {
    let backend = MemoryBackend::new();
    seed_portfolio(&backend, "old-live", "Web", true).await;
    seed_portfolio(&backend, "new-draft", "Web", false).await;

    let all = portfolios(&backend).get_all(&QueryOptions::new()).await.unwrap();
    let slugs: Vec<_> = all.iter().map(|p| p.slug.as_str()).collect();
    assert_eq!(slugs, vec!["new-draft", "old-live"]);

    let drafts = portfolios(&backend)
        .get_all(&QueryOptions::new().eq("published", false))
        .await
        .unwrap();
    assert_eq!(drafts.len(), 1);
}

#[tokio::test]
async fn test_update_is_partial() {
    let backend = MemoryBackend::new();
    let crud = portfolios(&backend);
    let created = crud.create(new_item("Original")).await.unwrap();

    let patch = PortfolioItemPatch {
        title: Some("Renamed".to_string()),
        ..Default::default()
    };
    let updated = crud.update(created.id, patch).await.unwrap();

    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.slug, created.slug);
    assert_eq!(updated.client, "Acme");
    assert_eq!(updated.created_at, created.created_at);
}

#[tokio::test]
async fn test_update_of_missing_row_is_not_found() {
    let backend = MemoryBackend::new();
    let err = portfolios(&backend)
        .update(Uuid::new_v4(), PortfolioItemPatch::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_remove_then_get_one_fails() {
    let backend = MemoryBackend::new();
    let crud = portfolios(&backend);
    let created = crud.create(new_item("Short lived")).await.unwrap();

    crud.remove(created.id).await.unwrap();
    let err = crud.get_one(created.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(crud.state().error.map(|e| e.kind), Some(HookErrorKind::NotFound));

    // Removing again is not an error.
    crud.remove(created.id).await.unwrap();
}

#[tokio::test]
async fn test_toggle_published_flips_current_value() {
    let backend = MemoryBackend::new();
    let crud = portfolios(&backend);
    let created = crud.create(new_item("Toggle me")).await.unwrap();

    let content = Content::new(store_of(&backend), None);

    let shown = crud.toggle_published(created.id, false).await.unwrap();
    assert!(shown.published);
    assert_eq!(content.portfolios().await.unwrap().len(), 1);

    let hidden = crud.toggle_published(created.id, true).await.unwrap();
    assert!(!hidden.published);
    assert!(content.portfolios().await.unwrap().is_empty());
    assert!(content.portfolio_by_slug("toggle-me").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_contact_submissions_cannot_be_published() {
    let backend = MemoryBackend::new();
    let crud = CrudHandle::<ContactSubmission>::new(store_of(&backend), None);
    let err = crud.toggle_published(Uuid::new_v4(), false).await.unwrap_err();
    assert!(matches!(err, BackendError::NotPublic { .. }));
}

#[tokio::test]
async fn test_error_is_cleared_when_next_call_starts() {
    let backend = MemoryBackend::new();
    let crud = portfolios(&backend);

    backend.fail_next("backend down").await;
    assert!(crud.get_all(&QueryOptions::new()).await.is_err());
    assert_eq!(crud.state().error.map(|e| e.message), Some("backend down".to_string()));

    crud.get_all(&QueryOptions::new()).await.unwrap();
    assert!(crud.state().error.is_none());
}

#[tokio::test]
async fn test_loading_tracks_in_flight_calls() {
    let backend = MemoryBackend::new();
    let crud = portfolios(&backend);
    backend.delay_next_reads([Duration::from_millis(100)]).await;

    let pending = tokio::spawn({
        let crud = crud.clone();
        async move { crud.get_all(&QueryOptions::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(crud.state().loading);

    // A quick call finishing first must not clear loading for the slow one.
    crud.get_all(&QueryOptions::new()).await.unwrap();
    assert!(crud.state().loading);

    pending.await.unwrap().unwrap();
    assert!(!crud.state().loading);
}

#[tokio::test]
async fn test_concurrent_updates_last_write_wins() {
    let backend = MemoryBackend::new();
    let crud = portfolios(&backend);
    let created = crud.create(new_item("Contested")).await.unwrap();

    let rename = |title: &str| PortfolioItemPatch {
        title: Some(title.to_string()),
        ..Default::default()
    };
    let (a, b) = tokio::join!(crud.update(created.id, rename("A")), crud.update(created.id, rename("B")));
    a.unwrap();
    b.unwrap();

    let stored = crud.get_one(created.id).await.unwrap();
    assert!(stored.title == "A" || stored.title == "B");
    assert!(!crud.state().loading);
}

#[tokio::test]
async fn test_contact_submit_normalises_phone() {
    let backend = MemoryBackend::new();
    let crud = CrudHandle::<ContactSubmission>::new(store_of(&backend), None);

    let form = NewContactSubmission {
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        phone: Some("  ".to_string()),
        service: "Branding".to_string(),
        message: "Hello".to_string(),
    };
    crud.submit(form.clone()).await.unwrap();

    let rows = backend.rows(Table::ContactSubmissions).await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].get("phone").is_none());

    let invalid = NewContactSubmission {
        email: "not-an-email".to_string(),
        ..form
    };
    let err = crud.submit(invalid).await.unwrap_err();
    assert!(matches!(err, BackendError::Validation(ValidationError::InvalidEmail)));
}

/// Create "Test", publish it, read it publicly, remove it.
#[tokio::test]
async fn test_portfolio_lifecycle_through_public_reads() {
    let backend = MemoryBackend::new();
    let crud = portfolios(&backend);
    let content = Content::new(store_of(&backend), None);

    let created = crud.create(new_item("Test")).await.unwrap();
    assert_eq!(created.slug, "test");
    assert!(content.portfolio_by_slug("test").await.unwrap_err().is_not_found());
    assert!(content.portfolios().await.unwrap().is_empty());

    crud.toggle_published(created.id, created.published).await.unwrap();
    let public = content.portfolio_by_slug("test").await.unwrap();
    assert_eq!(public.id, created.id);
    assert_eq!(public.tags, vec!["ux", "react"]);

    crud.remove(created.id).await.unwrap();
    assert!(content.portfolio_by_slug("test").await.unwrap_err().is_not_found());
    assert!(crud.get_one(created.id).await.unwrap_err().is_not_found());
}
