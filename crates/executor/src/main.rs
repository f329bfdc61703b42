use anyhow::Context;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use am_executor::{
    auth,
    cli::Cli,
    config::ConfigHolder,
    lifecycle::{self, Reloader, SHUTDOWN_TIMEOUT},
    metrics::Metrics,
    runner::ProcessRunner,
    server::{Listener, Server},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Load configuration
    let config = Arc::new(
        ConfigHolder::load(&cli.config_file)
            .with_context(|| format!("failed to load {}", cli.config_file.display()))?,
    );
    let snapshot = config.snapshot().await;

    if cli.create_token {
        let token = auth::create_token(&snapshot).context("Bearer token could not be created")?;
        println!("Bearer token: {}", token);
        return Ok(());
    }

    let metrics = Metrics::new().context("failed to register metrics")?;
    let runner = Arc::new(ProcessRunner::from_positional(cli.command.clone(), metrics.clone())?);
    let addr = cli.socket_addr()?;

    let listener = if snapshot.tls.enabled {
        let tls = RustlsConfig::from_pem_file(&snapshot.tls.cert_path, &snapshot.tls.key_path)
            .await
            .context("failed to load TLS certificate")?;
        Listener::Tls(tls)
    } else {
        Listener::Plain
    };

    let signals = lifecycle::forward_os_signals().context("failed to install signal handlers")?;
    lifecycle::spawn_reload_watcher(signals.reload, Reloader::new(config.clone(), listener.tls_config()));

    info!(
        "Starting am-executor {} on {} (tls: {}), running {} {:?}",
        env!("CARGO_PKG_VERSION"),
        addr,
        snapshot.tls.enabled,
        runner.command(),
        runner.args()
    );
    info!("Timeout offset: {}s", cli.timeout_offset);

    let handle = Handle::new();
    let server = Server::new(config, runner, metrics);
    let serving = tokio::spawn(server.serve(addr, listener, handle.clone()));

    match lifecycle::watch_termination(signals.terminate, handle, serving, SHUTDOWN_TIMEOUT).await {
        Ok(()) => {
            info!("Shutdown am-executor");
            Ok(())
        }
        Err(e) => {
            error!("Failed to shutdown am-executor gracefully: {}", e);
            std::process::exit(1);
        }
    }
}
