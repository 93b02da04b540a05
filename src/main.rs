use agency_site::{
    AppState, AuthState, PostgresRepository, S3StorageClient, StoreState, SupabaseRest,
    config::{AppConfig, Env},
    create_router,
    storage::{StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, picks the table store, and serves the site.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "agency_site=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    if config.admin_emails.is_empty() {
        tracing::warn!("ADMIN_EMAILS is empty: nobody can enter the admin area");
    }

    // 4. Auth Client
    // Auth always goes through the hosted auth service.
    let rest = SupabaseRest::new(
        &config.supabase_url,
        &config.supabase_anon_key,
        config.backend_timeout(),
    )
    .expect("FATAL: Failed to build the backend HTTP client.");
    let auth = Arc::new(rest.clone()) as AuthState;

    // 5. Table Store Selection (direct Postgres or PostgREST)
    let store = match &config.database_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            tracing::info!("Table store: direct Postgres");
            Arc::new(PostgresRepository::new(pool)) as StoreState
        }
        None => {
            tracing::info!("Table store: PostgREST at {}", config.supabase_url);
            Arc::new(rest) as StoreState
        }
    };

    // 6. Storage Initialization (S3/MinIO)
    let storage = config.storage.as_ref().map(S3StorageClient::new);
    if let (Some(client), Env::Local) = (&storage, config.env) {
        client.ensure_bucket_exists().await;
    }
    if storage.is_none() {
        tracing::warn!("Media storage is not configured; uploads are disabled");
    }

    // 7. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let mut app_state = AppState::new(store, auth, config);
    if let Some(client) = storage {
        app_state = app_state.with_storage(Arc::new(client) as StorageState);
    }

    // 8. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server stopped unexpectedly.");
}
