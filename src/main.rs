use clap::Parser;
use imageflow::auth::{ApiKey, DEFAULT_API_KEY};
use imageflow::server::{self, AppState, ServiceConfig};
use imageflow::RenderConfig;
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

/// HTML to image conversion API backed by headless Chrome
#[derive(Debug, Parser)]
#[command(name = "imageflow", version, about)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// API key for the conversion endpoint (overrides the API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Number of render worker threads
    #[arg(long)]
    render_workers: Option<usize>,

    /// Render time budget in milliseconds
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    /// Explicit Chrome/Chromium binary path
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Launch Chrome without its sandbox (needed in most containers)
    #[arg(long)]
    no_sandbox: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let api_key = cli
        .api_key
        .or_else(|| std::env::var("API_KEY").ok())
        .unwrap_or_else(|| DEFAULT_API_KEY.to_string());

    let config = ServiceConfig {
        render: RenderConfig {
            timeout_ms: cli.timeout_ms,
            chrome_path: cli.chrome_path,
            no_sandbox: cli.no_sandbox,
            ..Default::default()
        },
        render_workers: cli
            .render_workers
            .unwrap_or_else(|| num_cpus::get().min(4)),
        api_key,
    };

    // Log a fingerprint so operators can tell which key is active without
    // the key itself ever reaching the logs
    info!(
        "API key fingerprint: {}",
        ApiKey::new(&config.api_key).fingerprint()
    );

    let state = AppState::new(&config)?;
    let app = server::router(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("ImageFlow listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
