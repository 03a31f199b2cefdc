//! leadrelay Proxy Library
//!
//! Bounded-concurrency forwarding proxy in front of an insurance gateway.
//!
//! Lead transfers and quick quotes are validated, forwarded through a
//! concurrency gate under a single request deadline, decoded, and returned
//! to the caller. Accepted exchanges are persisted on detached tasks that
//! survive client disconnects.
//!
//! This library can be used either through the standalone `leadrelay-proxy`
//! binary or from the `leadrelay` CLI.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub mod dispatch;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod persistence;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod upstream;

pub use dispatch::{Dispatcher, Phase};
pub use error::{ConfigError, DispatchError};
pub use state::{AppState, ProxyConfig};
pub use upstream::{UpstreamEndpoints, UpstreamMode};

/// Server configuration for the proxy
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    pub proxy: ProxyConfig,
    /// Whether to print the banner on startup
    pub print_banner: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            proxy: ProxyConfig::default(),
            print_banner: true,
        }
    }
}

/// Initialize Prometheus metrics registry.
/// Should be called once before starting the server.
pub fn init_metrics() {
    if let Err(e) = metrics::register_metrics() {
        warn!("Failed to register Prometheus metrics: {}", e);
    }
}

/// Build the HTTP router around `state`
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/users/motor_lead", post(routes::lead_transfer))
        .route("/api/v1/quote/quick-quote", post(routes::quick_quote))
        .route("/api/v1/leads/:uuid", get(routes::get_lead))
        .route("/api/v1/quotes/:id", get(routes::get_quote))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit::rate_limit,
        ));

    Router::new()
        // Health endpoints
        .route("/health", get(routes::health))
        .route("/ping", get(routes::ping))
        .route("/ready", get(routes::ready))
        .route("/live", get(routes::live))
        .route("/metrics", get(routes::metrics))
        .route("/metrics/prometheus", get(routes::metrics_prometheus))
        // Gateway endpoints
        .merge(api)
        // Middleware
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the leadrelay proxy server.
///
/// This function starts the HTTP server and blocks until Ctrl-C.
///
/// # Example
/// ```no_run
/// use leadrelay_proxy::{run_server, ProxyConfig, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig {
///         proxy: ProxyConfig::from_env()?,
///         ..Default::default()
///     };
///     run_server(config).await
/// }
/// ```
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    init_metrics();

    info!(
        port = config.proxy.port,
        mode = %config.proxy.mode,
        max_concurrent_calls = config.proxy.max_concurrent_calls,
        "Starting leadrelay proxy v{}",
        env!("CARGO_PKG_VERSION")
    );

    let state = Arc::new(AppState::new(config.proxy.clone())?);

    let addr = format!("{}:{}", config.host, config.proxy.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("leadrelay proxy listening on http://{}", addr);
    info!("Lead transfer: http://{}/users/motor_lead", addr);
    info!("Quick quote:   http://{}/api/v1/quote/quick-quote", addr);
    info!("Health:        http://{}/health", addr);

    if config.print_banner {
        print_banner(&config, &state);
    }

    serve(listener, state, shutdown_signal()).await
}

/// Serve on `listener` until `shutdown` resolves, then drain pending saves
pub async fn serve<S>(listener: TcpListener, state: Arc<AppState>, shutdown: S) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let background = CancellationToken::new();
    state.limiter.spawn_cleanup_task(background.clone());

    let app = build_router(state.clone());
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await?;

    background.cancel();
    state.dispatcher.gate().close();

    let worker = state.dispatcher.worker();
    let grace = worker.timeout().saturating_add(Duration::from_secs(1));
    if worker.shutdown(grace).await {
        info!(persisted = worker.stats().persisted, "Persistence drained, shutting down");
    } else {
        warn!("Shut down with saves still pending");
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}

/// Print the startup banner
fn print_banner(config: &ServerConfig, state: &Arc<AppState>) {
    let addr = format!("{}:{}", config.host, config.proxy.port);
    let proxy = &config.proxy;

    println!();
    println!("==================================================");
    println!("  leadrelay proxy v{}", env!("CARGO_PKG_VERSION"));
    println!("==================================================");
    println!("  Listening on: http://{}", addr);
    println!("  Upstream mode: {}", proxy.mode);
    println!("    Lead transfer: {}", proxy.endpoints.lead_transfer);
    println!("    Quick quote:   {}", proxy.endpoints.quick_quote);
    println!();
    println!("  Concurrency:");
    println!("    Max concurrent calls: {}", state.dispatcher.gate().capacity());
    println!("    Request timeout: {}s", proxy.request_timeout.as_secs());
    println!(
        "    Persist timeout: {}s",
        state.dispatcher.worker().timeout().as_secs()
    );
    println!();
    println!("  Rate limit: {} rps (burst {})", proxy.rate_limit.rps, proxy.rate_limit.burst);
    println!(
        "  Storage: {}",
        match &proxy.db_path {
            Some(path) => format!("sqlite ({})", path.display()),
            None => format!("memory (last {} records)", proxy.memory_capacity),
        }
    );
    println!();
    println!("  Endpoints:");
    println!("    Leads:  POST /users/motor_lead, GET /api/v1/leads/:uuid");
    println!("    Quotes: POST /api/v1/quote/quick-quote, GET /api/v1/quotes/:id");
    println!("    Health: GET  /health, /ping, /ready, /live, /metrics");
    println!("    Prometheus: GET /metrics/prometheus");
    println!("==================================================");
    println!();
}
