//! Agentic RAG API Gateway
//!
//! HTTP surface for the research loop.
//! Handles:
//! - Streaming (SSE) and synchronous research requests
//! - Diagram analysis
//! - Stream cancellation
//! - Rate limiting
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;
mod registry;

use anyhow::Context;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use rag_agent::{ControlLoop, StreamPublisher};
use rag_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics,
    providers::Providers,
};
use registry::StreamRegistry;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::Notify};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use middleware::rate_limit::{rate_limit_middleware, RateLimitState};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub providers: Providers,
    pub control: Arc<ControlLoop>,
    pub publisher: StreamPublisher,
    pub registry: StreamRegistry,
}

impl AppState {
    pub fn new(config: AppConfig, providers: Providers) -> Self {
        let control = Arc::new(ControlLoop::from_config(&providers, &config));
        let publisher = StreamPublisher::new(control.clone(), config.agent.stream_buffer);

        Self {
            config: Arc::new(config),
            providers,
            control,
            publisher,
            registry: StreamRegistry::new(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config.observability);
    info!("Starting Agentic RAG Gateway v{}", rag_common::VERSION);

    init_metrics(&config.observability)?;

    let providers = Providers::from_config(&config).context("failed to build providers")?;
    info!(
        llm = ?providers.llm.provider_names(),
        web_search = providers.web.is_some(),
        reranker = providers.scorer.as_ref().map(|s| s.name().to_string()),
        vision = providers.vision.is_some(),
        "Providers configured"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = config.shutdown_timeout();

    let state = AppState::new(config, providers);
    let registry = state.registry.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let stop = Arc::new(Notify::new());
    let server = {
        let stop = stop.clone();
        axum::serve(listener, app).with_graceful_shutdown(async move { stop.notified().await })
    };
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        joined = &mut server => {
            joined??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    // Open SSE bodies would otherwise hold graceful shutdown forever
    let cancelled = registry.cancel_all();
    info!(cancelled, "Cancelled active streams");
    stop.notify_one();

    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(timeout_secs = shutdown_timeout.as_secs(), "Graceful shutdown timed out"),
    }

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

fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port != 0 {
        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                metrics::PROVIDER_BUCKETS,
            )?
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(port = config.metrics_port, "Prometheus exporter listening");
    }

    metrics::register_metrics();
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/search", post(handlers::stream::search_stream))
        .route("/search/sync", post(handlers::search::search_sync))
        .route("/vision/analyze", post(handlers::vision::analyze))
        .route("/streams/{id}", delete(handlers::stream::cancel_stream));

    let mut router = Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/rag", api_routes)
        .route_layer(from_fn(middleware::metrics::track_metrics));

    if state.config.rate_limit.enabled {
        let limiter = RateLimitState::from_config(&state.config.rate_limit);
        router = router.layer(from_fn_with_state(limiter, rate_limit_middleware));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
