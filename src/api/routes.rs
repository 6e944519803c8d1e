//! HTTP server setup and shared state.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::board::store::{self, BoardStorage};
use crate::board::{OrderedTaskStore, UserDirectory};
use crate::config::Config;

use super::tasks as tasks_api;
use super::types::HealthResponse;
use super::users as users_api;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Rank-maintaining task operations
    pub tasks: OrderedTaskStore,
    /// Upsert-by-email user registry
    pub users: UserDirectory,
    persistent: bool,
}

impl AppState {
    pub fn new(config: Config, storage: Arc<dyn BoardStorage>) -> Self {
        let persistent = storage.is_persistent();
        let tasks = OrderedTaskStore::new(Arc::clone(&storage))
            .with_compact_on_delete(config.compact_on_delete);
        let users = UserDirectory::new(storage);
        Self {
            config,
            tasks,
            users,
            persistent,
        }
    }
}

/// Build the application router with CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .nest("/users", users_api::routes())
        .nest("/tasks", tasks_api::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let storage = store::create_storage(
        config.store_type,
        config.data_dir.clone(),
        &config.db_name,
    )
    .await?;
    tracing::info!(
        "Using {} task storage (persistent: {})",
        config.store_type.as_str(),
        storage.is_persistent()
    );
    if config.compact_on_delete {
        tracing::info!("Categories are compacted after every delete");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, storage));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Allow any origin when none are configured, otherwise only the listed ones.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        tracing::debug!("CORS: allowing all origins");
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin {}: {}", origin, e);
                None
            }
        })
        .collect();
    tracing::info!("CORS: allowing origins {:?}", origins);
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Wait for SIGINT/SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

async fn root() -> &'static str {
    "Hello from Task Board Server."
}

/// GET /api/health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        store: state.config.store_type.as_str().to_string(),
        persistent: state.persistent,
    })
}
