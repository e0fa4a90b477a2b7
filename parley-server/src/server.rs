//! Server assembly: tracing, database pool, router, and lifecycle.

use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use axum::{
    Extension, Router,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::get,
    serve,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt};

use shared::config::server::{Config, DatabaseSection, LogFormat};

use crate::{
    app_state::AppState,
    db::bootstrap,
    handlers,
    middleware::{
        auth,
        request_context::{self, RequestIdState},
    },
    realtime::hub::{ChatHub, SharedChatHub},
    routes,
    services::chat_store::{PgChatStore, SharedChatStore},
    tracer,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Initializes the tracing subscriber from the logging configuration.
/// `RUST_LOG` still wins over the configured level when set.
pub fn initialize_tracing(config: &Config) -> String {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).init();
    } else {
        fmt_builder.with_ansi(true).init();
    }

    config.logging.level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// Creates the Postgres connection pool.
///
/// # Errors
/// Returns an error when the pool cannot be created.
pub async fn create_database_pool(db: &DatabaseSection) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect(&db.url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(db.max_connections as f64);
    Ok(pool)
}

pub fn create_app_state(pool: Option<sqlx::PgPool>) -> Arc<AppState> {
    Arc::new(AppState::new(pool))
}

/// CORS layer for browser clients. An empty origin list allows any
/// origin, which is the development default.
pub fn create_cors_layer(config: &Config) -> CorsLayer {
    use http::Method;

    let methods = vec![Method::GET, Method::POST, Method::OPTIONS];

    let mut cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::any())
        .max_age(Duration::from_secs(config.server.cors.max_age_seconds));

    if config.server.cors.allowed_origins.is_empty() {
        cors = cors.allow_origin(AllowOrigin::any());
    } else {
        let origins = config
            .server
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        cors = cors
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(config.server.cors.allow_credentials);
    }

    cors
}

/// The authenticated API surface: every chat route sits behind the
/// session middleware.
pub fn create_api_router() -> Router<Arc<AppState>> {
    handlers::chat::routes().route_layer(axum::middleware::from_fn(auth::require_session))
}

/// Assembles the full application router.
///
/// Request-id assignment runs outside the trace layer so every span
/// carries the id; the session check only guards the API routes, so the
/// probes, metrics, and the WebSocket handshake stay reachable.
pub fn create_app_router(
    state: Arc<AppState>,
    config: Arc<Config>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let store: SharedChatStore = Arc::new(PgChatStore::new(state.pool.clone()));
    let hub: SharedChatHub = Arc::new(ChatHub::new(store));

    let request_id_state = RequestIdState::from_config(&config);
    let cors = create_cors_layer(&config);

    Router::new()
        .merge(create_api_router())
        .merge(handlers::socket::routes())
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .layer(tracer::create_trace_layer())
        .layer(axum::middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
        .layer(cors)
        .layer(Extension(hub))
        .layer(Extension(config))
        .layer(Extension(metrics_handle))
        .layer(Extension(state.clone()))
        .with_state(state)
}

/// Resolves when a shutdown signal is received.
pub async fn create_shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    info!("shutting down");
}

/// Starts the server with the resolved configuration.
///
/// # Errors
/// Returns an error when the database is unreachable, the bootstrap
/// fails, or the listener cannot bind.
pub async fn run(config: Config) -> anyhow::Result<()> {
    initialize_tracing(&config);
    info!("starting parley server");

    let metrics_handle = metrics_handle();
    let config = Arc::new(config);

    let pool = create_database_pool(&config.db).await?;
    bootstrap::ensure_liveness(&pool).await?;
    bootstrap::run(&pool).await?;
    bootstrap::ensure_readiness(&pool).await?;

    let state = create_app_state(Some(pool));
    let app = create_app_router(state, config.clone(), metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    serve(listener, app)
        .with_graceful_shutdown(create_shutdown_signal())
        .await?;

    Ok(())
}
