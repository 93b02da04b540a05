#![allow(dead_code)]

use agency_site::{
    AppConfig, AppState, AuthState, MemoryBackend, MockStorageService, StoreState,
    auth::AuthProvider,
    models::{BlogPost, PortfolioItem, Service, Table},
    repository::{TableStore, decode},
    storage::StorageState,
};
use axum::{body::Body, http::Response};
use serde_json::{Value, json};
use std::sync::Arc;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "correct-horse";
pub const VISITOR_EMAIL: &str = "visitor@example.com";
pub const VISITOR_PASSWORD: &str = "battery-staple";

/// Test configuration: `admin@example.com` is the only admin, no content cache.
pub fn test_config() -> AppConfig {
    AppConfig {
        admin_emails: vec![ADMIN_EMAIL.to_string()],
        content_cache_ttl_secs: 0,
        ..AppConfig::default()
    }
}

pub fn store_of(backend: &MemoryBackend) -> StoreState {
    Arc::new(backend.clone()) as StoreState
}

pub fn test_state(backend: &MemoryBackend) -> AppState {
    AppState::new(store_of(backend), Arc::new(backend.clone()) as AuthState, test_config())
        .with_storage(Arc::new(MockStorageService::new()) as StorageState)
}

/// Like `test_state`, with the content cache switched on as in production.
pub fn cached_state(backend: &MemoryBackend) -> AppState {
    let config = AppConfig {
        content_cache_ttl_secs: 30,
        ..test_config()
    };
    AppState::new(store_of(backend), Arc::new(backend.clone()) as AuthState, config)
        .with_storage(Arc::new(MockStorageService::new()) as StorageState)
}

/// Registers and signs in an account, returning its access token.
pub async fn sign_in_as(backend: &MemoryBackend, email: &str, password: &str) -> String {
    backend.register(email, password).await;
    backend
        .sign_in(email, password)
        .await
        .expect("sign-in of a freshly registered account")
        .access_token
}

pub async fn admin_token(backend: &MemoryBackend) -> String {
    sign_in_as(backend, ADMIN_EMAIL, ADMIN_PASSWORD).await
}

pub async fn visitor_token(backend: &MemoryBackend) -> String {
    sign_in_as(backend, VISITOR_EMAIL, VISITOR_PASSWORD).await
}

pub async fn seed_portfolio(backend: &MemoryBackend, slug: &str, category: &str, published: bool) -> PortfolioItem {
    let row = backend
        .insert(
            Table::Portfolios,
            json!({
                "title": slug.replace('-', " "),
                "slug": slug,
                "category": category,
                "client": "Acme",
                "year": "2024",
                "tags": ["design", "web"],
                "published": published,
            }),
        )
        .await
        .expect("seed portfolio");
    decode(row).expect("decode portfolio")
}

pub async fn seed_service(backend: &MemoryBackend, slug: &str, published: bool) -> Service {
    let row = backend
        .insert(
            Table::Services,
            json!({
                "title": slug.replace('-', " "),
                "slug": slug,
                "features": ["audit", "report"],
                "published": published,
            }),
        )
        .await
        .expect("seed service");
    decode(row).expect("decode service")
}

pub async fn seed_post(backend: &MemoryBackend, slug: &str, category: &str, published: bool) -> BlogPost {
    let row = backend
        .insert(
            Table::BlogPosts,
            json!({
                "title": slug.replace('-', " "),
                "slug": slug,
                "category": category,
                "content": "Body text",
                "published": published,
            }),
        )
        .await
        .expect("seed post");
    decode(row).expect("decode post")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
