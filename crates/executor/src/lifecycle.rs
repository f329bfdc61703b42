//! Termination and reload watchers.
//!
//! OS signals are forwarded into channels and each watcher consumes exactly
//! one channel: SIGINT/SIGTERM feed the termination watcher, SIGHUP feeds the
//! reload watcher.

use axum_server::{tls_rustls::RustlsConfig, Handle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    config::{Config, ConfigHolder},
    Error, Result,
};

/// How long in-flight requests get to finish after a termination signal.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Signals {
    pub terminate: mpsc::Receiver<()>,
    pub reload: mpsc::Receiver<()>,
}

/// Installs the signal handlers and forwards every signal into [`Signals`].
#[cfg(unix)]
pub fn forward_os_signals() -> Result<Signals> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let (terminate_tx, terminate_rx) = mpsc::channel(1);
    let (reload_tx, reload_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => info!("Received SIGTERM"),
            _ = interrupt.recv() => info!("Received SIGINT"),
        }
        let _ = terminate_tx.send(()).await;
    });

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP");
            // A reload that is already queued covers this signal too.
            if let Err(mpsc::error::TrySendError::Closed(_)) = reload_tx.try_send(()) {
                break;
            }
        }
    });

    Ok(Signals {
        terminate: terminate_rx,
        reload: reload_rx,
    })
}

#[cfg(not(unix))]
pub fn forward_os_signals() -> Result<Signals> {
    let (terminate_tx, terminate_rx) = mpsc::channel(1);
    let (_reload_tx, reload_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = terminate_tx.send(()).await;
        }
    });
    Ok(Signals {
        terminate: terminate_rx,
        reload: reload_rx,
    })
}

/// Waits for a termination request, then shuts the server down gracefully.
///
/// New connections are refused as soon as the request arrives; requests
/// already admitted (and the commands they started) get `timeout` to finish.
/// Commands still running after the timeout are left alone. Returns an error
/// when the timeout elapses or when the server stops before any termination
/// request.
pub async fn watch_termination(
    mut terminate: mpsc::Receiver<()>,
    handle: Handle,
    mut server: JoinHandle<Result<()>>,
    timeout: Duration,
) -> Result<()> {
    tokio::select! {
        // A closed channel counts as a request: nobody is left to send one.
        _ = terminate.recv() => {
            info!("Shutting down gracefully, waiting up to {:?} for in-flight requests", timeout);
            handle.graceful_shutdown(None);
            match tokio::time::timeout(timeout, &mut server).await {
                Ok(joined) => flatten(joined),
                Err(_) => {
                    warn!("{} connection(s) still open after {:?}", handle.connection_count(), timeout);
                    Err(Error::Shutdown(format!(
                        "in-flight requests did not finish within {:?}",
                        timeout
                    )))
                }
            }
        }
        joined = &mut server => {
            flatten(joined)?;
            Err(Error::Shutdown("server stopped without a termination signal".to_string()))
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| Error::Shutdown(format!("server task failed: {}", e)))?
}

/// Applies a reload to the configuration holder and, when serving TLS, to
/// the certificate used by the listener.
#[derive(Clone)]
pub struct Reloader {
    config: Arc<ConfigHolder>,
    tls: Option<RustlsConfig>,
}

impl Reloader {
    pub fn new(config: Arc<ConfigHolder>, tls: Option<RustlsConfig>) -> Self {
        Self { config, tls }
    }

    /// Either everything is applied or nothing is.
    pub async fn reload(&self) -> Result<Arc<Config>> {
        let candidate = self.config.read_source()?;
        if let Some(tls) = &self.tls {
            if candidate.tls.enabled {
                tls.reload_from_pem_file(&candidate.tls.cert_path, &candidate.tls.key_path)
                    .await
                    .map_err(|e| Error::Config(format!("failed to reload TLS certificate: {}", e)))?;
            } else {
                warn!("TLS was disabled in the configuration; the listener keeps serving TLS until restart");
            }
        } else if candidate.tls.enabled {
            warn!("TLS was enabled in the configuration; the listener keeps serving plain HTTP until restart");
        }
        Ok(self.config.replace(candidate).await)
    }
}

/// Handles every reload request until the channel closes.
pub fn spawn_reload_watcher(mut reload: mpsc::Receiver<()>, reloader: Reloader) -> JoinHandle<()> {
    tokio::spawn(async move {
        while reload.recv().await.is_some() {
            match reloader.reload().await {
                Ok(_) => info!("Configuration reloaded from {}", reloader.config.path().display()),
                Err(e) => error!("Could not reload configuration: {}", e),
            }
        }
    })
}
