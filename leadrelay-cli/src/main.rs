use std::path::PathBuf;

use clap::{Parser, Subcommand};
use leadrelay_proxy::{run_server, ProxyConfig, ServerConfig, UpstreamMode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Variables read by the proxy, in display order
const ENV_VARS: &[&str] = &[
    "LEADRELAY_PORT",
    "LEADRELAY_API_TOKEN",
    "LEADRELAY_LEAD_TRANSFER_ENDPOINT",
    "LEADRELAY_QUICK_QUOTE_ENDPOINT",
    "LEADRELAY_REQUEST_TIMEOUT_SECS",
    "LEADRELAY_PERSIST_TIMEOUT_SECS",
    "LEADRELAY_MAX_CONCURRENT_CALLS",
    "LEADRELAY_RATE_LIMIT_RPS",
    "LEADRELAY_RATE_LIMIT_BURST",
    "LEADRELAY_DB_PATH",
    "LEADRELAY_MEMORY_CAPACITY",
    "LEADRELAY_UPSTREAM_MODE",
];

#[derive(Parser)]
#[command(name = "leadrelay")]
#[command(version)]
#[command(about = "leadrelay - forwarding proxy for insurance lead and quote requests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Port to listen on (overrides LEADRELAY_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Upstream mode: live or synthetic (overrides LEADRELAY_UPSTREAM_MODE)
        #[arg(short, long)]
        mode: Option<UpstreamMode>,

        /// SQLite database file (overrides LEADRELAY_DB_PATH)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Maximum concurrent upstream calls (overrides LEADRELAY_MAX_CONCURRENT_CALLS)
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        max_concurrent: Option<usize>,

        /// Don't print the startup banner
        #[arg(long)]
        no_banner: bool,
    },

    /// Show the environment the proxy would start with
    CheckEnv {
        /// Print the resolved configuration as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            mode,
            db_path,
            max_concurrent,
            no_banner,
        } => {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("leadrelay_proxy=info,tower_http=info"));
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(false))
                .with(filter)
                .init();

            let mut proxy = match mode {
                // Mode from the command line wins over the environment
                Some(mode) => ProxyConfig::from_lookup(|key| match key {
                    "LEADRELAY_UPSTREAM_MODE" => Some(mode.to_string()),
                    _ => std::env::var(key).ok(),
                })?,
                None => ProxyConfig::from_env()?,
            };
            if let Some(port) = port {
                proxy.port = port;
            }
            if let Some(path) = db_path {
                proxy.db_path = Some(path);
            }
            if let Some(max) = max_concurrent {
                proxy.max_concurrent_calls = max;
            }

            run_server(ServerConfig {
                host,
                proxy,
                print_banner: !no_banner,
            })
            .await?;
        }

        Commands::CheckEnv { json } => {
            println!("=== Environment ===");
            for name in ENV_VARS {
                match std::env::var(name) {
                    Ok(value) if *name == "LEADRELAY_API_TOKEN" => {
                        println!("{}: set ({})", name, mask(&value))
                    }
                    Ok(value) => println!("{}: {}", name, value),
                    Err(_) => println!("{}: not set", name),
                }
            }
            println!();

            let config = match ProxyConfig::from_env() {
                Ok(config) => config,
                Err(e) => {
                    println!("=== Configuration ===");
                    println!("Invalid: {}", e);
                    std::process::exit(1);
                }
            };

            println!("=== Configuration ===");
            println!("Port: {}", config.port);
            println!("Upstream mode: {}", config.mode);
            println!("Lead transfer endpoint: {}", config.endpoints.lead_transfer);
            println!("Quick quote endpoint: {}", config.endpoints.quick_quote);
            println!("Max concurrent calls: {}", config.max_concurrent_calls);
            println!("Request timeout: {}s", config.request_timeout.as_secs());
            println!(
                "Persist timeout: {}s",
                config.effective_persist_timeout().as_secs()
            );
            println!(
                "Rate limit: {} rps (burst {})",
                config.rate_limit.rps, config.rate_limit.burst
            );
            match &config.db_path {
                Some(path) => println!("Storage: sqlite ({})", path.display()),
                None => println!("Storage: memory (last {} records)", config.memory_capacity),
            }
            println!();
            println!("Configuration OK");

            if json {
                println!();
                println!("=== JSON Output ===");
                let summary = serde_json::json!({
                    "port": config.port,
                    "upstream_mode": config.mode,
                    "lead_transfer_endpoint": config.endpoints.lead_transfer,
                    "quick_quote_endpoint": config.endpoints.quick_quote,
                    "max_concurrent_calls": config.max_concurrent_calls,
                    "request_timeout_secs": config.request_timeout.as_secs(),
                    "persist_timeout_secs": config.effective_persist_timeout().as_secs(),
                    "rate_limit_rps": config.rate_limit.rps,
                    "rate_limit_burst": config.rate_limit.burst,
                    "db_path": config.db_path,
                    "memory_capacity": config.memory_capacity,
                    "api_token_set": config.api_token.is_some(),
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
    }

    Ok(())
}

/// Keep only enough of a secret to recognise it
fn mask(secret: &str) -> String {
    let secret = secret.trim();
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
