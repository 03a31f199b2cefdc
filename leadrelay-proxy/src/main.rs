//! leadrelay proxy - bounded-concurrency forwarding proxy for lead and quote requests.
//!
//! ## Quick Start
//!
//! ```bash
//! # Live mode against the test gateway
//! LEADRELAY_API_TOKEN=secret leadrelay-proxy
//!
//! # Demo deployment, no network calls upstream
//! LEADRELAY_UPSTREAM_MODE=synthetic LEADRELAY_PORT=9100 leadrelay-proxy
//! ```

use leadrelay_proxy::{run_server, ProxyConfig, ServerConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("leadrelay_proxy=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load configuration
    let config = ServerConfig {
        proxy: ProxyConfig::from_env()?,
        ..Default::default()
    };

    run_server(config).await
}
