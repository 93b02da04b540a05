use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Page data for every public route. All reads go through the content queries,
/// which only ever return published rows.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check; never touches the backend.
        .route("/health", get(|| async { "ok" }))
        .route("/", get(handlers::home))
        .route("/about", get(handlers::about))
        .route("/services", get(handlers::list_services))
        .route("/services/{slug}", get(handlers::get_service))
        // GET /portfolio?category=...
        .route("/portfolio", get(handlers::list_portfolio))
        .route("/portfolio/{slug}", get(handlers::get_portfolio_item))
        // GET /blog?category=...
        .route("/blog", get(handlers::list_blog))
        .route("/blog/{slug}", get(handlers::get_blog_post))
        // POST /contact
        // Insert-only: the submission is stored but never read back.
        .route("/contact", post(handlers::submit_contact))
}
