use std::time::Duration;

use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod cache;
pub mod config;
pub mod content;
pub mod crud;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod reader;
pub mod repository;
pub mod storage;

pub mod routes;
use routes::{admin, public};

// --- Public Re-exports ---

pub use auth::{AuthState, RevokedSessions};
pub use cache::QueryCache;
pub use config::AppConfig;
pub use content::Content;
pub use crud::CrudHandle;
pub use gate::AdminPolicy;
pub use reader::ContentQuery;
pub use repository::{MemoryBackend, PostgresRepository, StoreState, SupabaseRest};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// Upper bound on cached public reads.
const CACHE_CAPACITY: u64 = 1_000;
/// Longest access-token lifetime the backend issues; signed-out tokens are
/// remembered this long.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);
const REVOKED_CAPACITY: u64 = 10_000;

/// ApiDoc
///
/// OpenAPI document served at `/api-docs/openapi.json`. The generic admin CRUD
/// routes are not listed.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::home, handlers::about, handlers::list_services, handlers::get_service,
        handlers::list_portfolio, handlers::get_portfolio_item, handlers::list_blog,
        handlers::get_blog_post, handlers::submit_contact, handlers::login_page,
        handlers::login, handlers::signup, handlers::logout, handlers::session_info,
        handlers::dashboard, handlers::presigned_upload
    ),
    components(
        schemas(
            models::PortfolioItem, models::Service, models::BlogPost, models::ContactSubmission,
            models::NewPortfolioItem, models::PortfolioItemPatch, models::NewService,
            models::ServicePatch, models::NewBlogPost, models::BlogPostPatch,
            models::NewContactSubmission, models::PublishToggle, models::LoginRequest,
            models::SignUpRequest, models::AuthSession, models::SessionUser, models::SessionInfo,
            models::LoginPrompt, models::PresignedUrlRequest, models::PresignedUrlResponse,
            models::HomePage, models::AboutPage, models::DashboardSummary, models::TableCount,
            models::SectionError, models::Table, error::ErrorBody,
        )
    ),
    tags(
        (name = "agency-site", description = "Agency site content API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared by every request: the table store, the auth collaborator, the admin
/// policy, the optional content cache and media storage, and the configuration.
#[derive(Clone)]
pub struct AppState {
    pub store: StoreState,
    pub auth: AuthState,
    pub policy: AdminPolicy,
    pub cache: Option<QueryCache>,
    pub storage: Option<StorageState>,
    pub revoked: RevokedSessions,
    pub config: AppConfig,
}

impl AppState {
    /// Builds the state, deriving the admin policy and content cache from `config`.
    pub fn new(store: StoreState, auth: AuthState, config: AppConfig) -> Self {
        let cache = config
            .content_cache_ttl()
            .map(|ttl| QueryCache::new(ttl, CACHE_CAPACITY));
        Self {
            store,
            auth,
            policy: AdminPolicy::from_config(&config),
            cache,
            storage: None,
            revoked: RevokedSessions::new(MAX_TOKEN_LIFETIME, REVOKED_CAPACITY),
            config,
        }
    }

    pub fn with_storage(mut self, storage: StorageState) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Public content queries over the anonymous store.
    pub fn content(&self) -> Content {
        Content::new(self.store.clone(), self.cache.clone())
    }

    /// CRUD access to one table, running as the admin's session.
    pub fn crud<T: models::Record>(&self, session: &auth::AdminSession) -> CrudHandle<T> {
        CrudHandle::new(self.store.with_access_token(&session.access_token), self.cache.clone())
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for StoreState {
    fn from_ref(app_state: &AppState) -> StoreState {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(app_state: &AppState) -> AuthState {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for RevokedSessions {
    fn from_ref(app_state: &AppState) -> RevokedSessions {
        app_state.revoked.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routes, the admin gate and the observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        // Session endpoints are open; everything else under /admin passes the gate.
        .nest("/admin", admin::admin_routes(state.clone()))
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing, tagged with the request id
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation back to the client
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, tagged with its `x-request-id` so every log
/// line of the request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
