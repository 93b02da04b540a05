use crate::{
    AppState,
    gate::admin_gate,
    handlers::{self, admin_create, admin_delete, admin_get, admin_list, admin_toggle_published, admin_update},
    models::{BlogPost, ContactSubmission, Editable, PortfolioItem, Service},
};
use axum::{
    Router, middleware,
    routing::{get, post},
};

/// Admin Router Module
///
/// Everything under `/admin`. The login, signup, logout and session endpoints
/// stay reachable without a session; every other route sits behind
/// `admin_gate`, which redirects non-admins to the login route before the
/// handler runs.
pub fn admin_routes(state: AppState) -> Router<AppState> {
    session_routes().merge(
        protected_routes().route_layer(middleware::from_fn_with_state(state, admin_gate)),
    )
}

fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/signup", post(handlers::signup))
        .route("/logout", post(handlers::logout))
        .route("/session", get(handlers::session_info))
}

/// The CRUD surface of one publishable content kind, mounted at `base`.
fn editable_routes<T: Editable + Clone>(base: &str) -> Router<AppState> {
    Router::new()
        .route(base, get(admin_list::<T>).post(admin_create::<T>))
        .route(
            &format!("{base}/{{id}}"),
            get(admin_get::<T>)
                .put(admin_update::<T>)
                .delete(admin_delete::<T>),
        )
        .route(&format!("{base}/{{id}}/publish"), post(admin_toggle_published::<T>))
}

fn protected_routes() -> Router<AppState> {
    Router::new()
        // GET /admin -> /admin/dashboard
        .route("/", get(handlers::admin_root))
        .route("/dashboard", get(handlers::dashboard))
        .merge(editable_routes::<PortfolioItem>("/portfolio"))
        .merge(editable_routes::<Service>("/services"))
        .merge(editable_routes::<BlogPost>("/blog"))
        // Contact submissions are read and deleted, never edited.
        .route("/contacts", get(admin_list::<ContactSubmission>))
        .route(
            "/contacts/{id}",
            get(admin_get::<ContactSubmission>).delete(admin_delete::<ContactSubmission>),
        )
        .route("/uploads/presigned", post(handlers::presigned_upload))
}
