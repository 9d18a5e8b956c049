//! Folio Assistant Gateway
//!
//! The HTTP front door of the portfolio chat backend.
//! Handles:
//! - The chat endpoint used by the site's chat widget
//! - Health, readiness, and Prometheus metrics endpoints
//! - Optional rate limiting of the chat route
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get},
    Router,
};
use folio_common::{
    config::{AppConfig, ObservabilityConfig},
    knowledge::KnowledgeBase,
    llm::create_language_model,
    metrics::{self, LATENCY_BUCKETS, PROVIDER_BUCKETS},
    ChatService,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use middleware::rate_limit::{create_rate_limiter, rate_limit_middleware, GlobalRateLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub chat: Arc<ChatService>,
    pub metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Configuration decides the log format, so load it before tracing
    let config = AppConfig::load();
    let observability = config
        .as_ref()
        .map(|c| c.observability.clone())
        .unwrap_or_default();
    init_tracing(&observability);

    info!("Starting Folio Assistant Gateway v{}", folio_common::VERSION);

    let config = config.map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    // Initialize metrics
    let metrics_handle = if config.observability.metrics_enabled {
        let handle = install_metrics_recorder()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    // Knowledge base is loaded once and shared read-only
    let knowledge = Arc::new(KnowledgeBase::load(&config.knowledge.path).map_err(|e| {
        tracing::error!(error = %e, path = %config.knowledge.path, "Failed to load knowledge base");
        e
    })?);

    let model = create_language_model(&config.llm)?;
    info!(provider = %config.llm.provider, model = %model.model_name(), "Language model ready");

    let chat = Arc::new(ChatService::from_config(&config, knowledge, model));

    let rate_limiter = if config.rate_limit.enabled {
        Some(create_rate_limiter(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        )?)
    } else {
        None
    };

    // Create app state
    let state = AppState {
        config: config.clone(),
        chat,
        metrics: metrics_handle,
    };

    // Build the router
    let app = create_router(state, rate_limiter);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_recorder() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("provider_duration_seconds".to_string()),
            PROVIDER_BUCKETS,
        )?
        .install_recorder()?;
    Ok(handle)
}

/// Create the main application router
fn create_router(state: AppState, rate_limiter: Option<Arc<GlobalRateLimiter>>) -> Router {
    // The chat widget is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Every method is routed to the chat handler so non-POST calls get a JSON 405
    let mut chat_routes = Router::new().route("/api/chat", any(handlers::chat::chat));
    if let Some(limiter) = rate_limiter {
        chat_routes = chat_routes.route_layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    let ops_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics));

    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        .merge(chat_routes)
        .merge(ops_routes)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
