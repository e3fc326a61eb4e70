//! vbmcd: supervisor of emulated BMC workers.
//!
//! Exposes the layers for integration testing; the binary is a thin wrapper
//! around [`serve`] and [`worker::run`].

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod application;
pub mod domain;
pub mod infra;
pub mod logging;
pub mod server;
pub mod worker;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use vbmc_common::AppConfig;

use crate::application::services::{Supervisor, SupervisorSettings};
use crate::infra::backend::CliBackendProbe;
use crate::infra::pidfile::PidFile;
use crate::infra::process::ProcessSpawner;
use crate::infra::store::IniConfigStore;
use crate::server::{Server, ServerSettings};

/// Run the supervisor until SIGINT or SIGTERM.
///
/// # Errors
///
/// Fails if another supervisor holds the pid file, the RPC port cannot be
/// bound, or the shutdown sweep fails.
pub async fn serve(config: AppConfig) -> Result<()> {
    let pid_file = PidFile::acquire(&config.pid_path())?;
    let addr = config.server_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding RPC endpoint {addr}"))?;
    info!(
        %addr,
        config_dir = %config.config_dir.display(),
        pid_file = %pid_file.path().display(),
        "vbmcd listening"
    );

    let supervisor = Supervisor::new(
        IniConfigStore::new(&config.config_dir),
        ProcessSpawner::current_exe(config.config_dir.clone(), config.session_timeout())?,
        CliBackendProbe::new(config.probe_timeout()),
        SupervisorSettings {
            probe_timeout: config.probe_timeout(),
            terminate_grace: config.terminate_grace(),
        },
    );
    let settings = ServerSettings {
        read_timeout: config.response_timeout(),
        reconcile_interval: config.reconcile_interval(),
        show_passwords: config.show_passwords,
    };
    Server::new(supervisor, settings)
        .run(listener, shutdown_signal())
        .await?;
    info!("vbmcd stopped");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
