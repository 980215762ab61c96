//! SheetSync Server - form intake and spreadsheet-to-Notion sync.
//!
//! Accepts form submissions, records them in a Google Sheet and a calendar
//! invite, and runs one background job per sheet that mirrors new rows into
//! a Notion database using the sheetsync-engine poll cycle.

mod auth;
mod config;
mod db;
mod error;
mod google;
mod handlers;
mod notion;
mod routes;
mod sync;

use crate::config::Config;
use crate::db::{PgCheckpointStore, Pool};
use crate::google::GoogleClient;
use crate::notion::NotionClient;
use crate::sync::{JobDeps, JobRegistry};
use axum::http::HeaderValue;
use axum::Router;
use sheetsync_engine::FormRowTransformer;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub google: Arc<GoogleClient>,
    pub registry: Arc<JobRegistry>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sheetsync_server=debug,sheetsync_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting SheetSync Server on {}:{}", config.host, config.port);

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // External services
    let google = Arc::new(GoogleClient::new(
        &config.google_sheets_base_url,
        &config.google_calendar_base_url,
        &config.google_token_path,
        config.http_timeout,
    )?);
    tracing::info!(token_path = %google.token_path().display(), "Reading Google token from file");
    let notion = NotionClient::new(
        &config.notion_base_url,
        &config.notion_api_key,
        &config.notion_database_id,
        config.http_timeout,
    )?;
    tracing::info!(database_id = %notion.database_id(), "Syncing into Notion database");

    // Sync jobs, resumed from their checkpoints
    let deps = JobDeps {
        source: google.clone(),
        transformer: Arc::new(FormRowTransformer::new()),
        sink: Arc::new(notion),
        checkpoints: Arc::new(PgCheckpointStore::new(pool.clone())),
    };
    let registry = JobRegistry::new_shared(deps, config.poll_interval, config.retry);
    registry.restore().await?;

    // Build application state
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        google,
        registry: registry.clone(),
    };

    // Build router
    let app = Router::new()
        .merge(routes::create_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_allowed_origins)),
        )
        .with_state(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

/// CORS for the configured origins, or any origin when none are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
