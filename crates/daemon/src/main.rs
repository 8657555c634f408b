#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mcpforge_daemon::config::DaemonConfig;
use mcpforge_daemon::http;
use mcpforge_daemon::orchestrator::ForgeService;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "mcpforge-daemon", version, about = "MCP server generation daemon")]
struct Cli {
    /// Optional TOML config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base directory for relative registry/artifact paths.
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Where the HTTP API will listen, e.g. 127.0.0.1:8080
    #[arg(long)]
    listen: Option<String>,

    /// Synthesis backend endpoint.
    #[arg(long)]
    llm_url: Option<String>,

    /// Command used to run artifacts, e.g. "python3 -u".
    #[arg(long)]
    interpreter: Option<String>,

    /// Log level (env-filter syntax).
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load_from(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(url) = cli.llm_url {
        config.synth.url = url;
    }
    if let Some(interpreter) = cli.interpreter {
        config.interpreter = interpreter;
    }
    if let Some(log) = cli.log {
        config.log = log;
    }

    fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::new(&config.log))
        .init();

    let base = std::fs::canonicalize(&cli.base_dir).unwrap_or_else(|_| cli.base_dir.clone());
    let config = config.resolve_paths(&base);
    info!(?config, "starting daemon");

    let svc = ForgeService::from_config(&config)
        .await
        .context("initialise service")?;
    let app = http::router(Arc::new(svc));

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", config.listen))?;
    info!("listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
