//! RPC server: one JSON request and one JSON response per TCP connection.
//!
//! Connections are served one at a time on the same task that runs the
//! periodic reconciliation, so the supervisor never sees concurrent calls.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use vbmc_common::rpc::MAX_MESSAGE_BYTES;
use vbmc_common::{BmcError, BmcResult, BmcView, Request, Response};

use crate::application::ports::{BackendProbe, ConfigStore, WorkerSpawner};
use crate::application::services::Supervisor;

/// Columns of the `list` table.
pub const LIST_HEADER: [&str; 5] = ["name", "status", "backend_type", "address", "port"];

/// Columns of the `show` table.
pub const SHOW_HEADER: [&str; 2] = ["property", "value"];

#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    /// How long a client may take to send its request.
    pub read_timeout: Duration,
    pub reconcile_interval: Duration,
    pub show_passwords: bool,
}

/// Multi-name operations.
#[derive(Debug, Clone, Copy)]
enum Op {
    Delete,
    Start,
    Stop,
}

pub struct Server<S, W, P>
where
    W: WorkerSpawner,
{
    supervisor: Supervisor<S, W, P>,
    settings: ServerSettings,
}

impl<S, W, P> Server<S, W, P>
where
    S: ConfigStore,
    W: WorkerSpawner,
    P: BackendProbe,
{
    pub fn new(supervisor: Supervisor<S, W, P>, settings: ServerSettings) -> Self {
        Self {
            supervisor,
            settings,
        }
    }

    pub fn supervisor(&mut self) -> &mut Supervisor<S, W, P> {
        &mut self.supervisor
    }

    /// Serve until `shutdown` resolves, then stop every worker.
    ///
    /// # Errors
    ///
    /// Only the final shutdown sweep can fail the server.
    pub async fn run(mut self, listener: TcpListener, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.settings.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.supervisor.periodic(false).await {
                        error!(error = %e, "periodic reconciliation failed");
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = self.exchange(stream).await {
                            warn!(%peer, error = %format!("{e:#}"), "RPC exchange failed");
                        }
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }

        info!("shutting down, stopping all workers");
        self.supervisor
            .periodic(true)
            .await
            .context("stopping workers on shutdown")
    }

    async fn exchange(&mut self, mut stream: TcpStream) -> Result<()> {
        let mut buf = Vec::new();
        let read = tokio::time::timeout(
            self.settings.read_timeout,
            (&mut stream).take(MAX_MESSAGE_BYTES + 1).read_to_end(&mut buf),
        )
        .await;
        let response = match read {
            Err(_) => Response::error(1, "timed out waiting for the request"),
            Ok(Err(e)) => return Err(e).context("reading request"),
            Ok(Ok(len)) if u64::try_from(len).unwrap_or(u64::MAX) > MAX_MESSAGE_BYTES => {
                Response::error(1, format!("request exceeds {MAX_MESSAGE_BYTES} bytes"))
            }
            Ok(Ok(_)) => self.handle_bytes(&buf).await,
        };
        let bytes = response.encode()?;
        stream.write_all(&bytes).await.context("writing response")?;
        stream.shutdown().await.context("closing connection")?;
        Ok(())
    }

    /// Decode and answer one encoded request.
    pub async fn handle_bytes(&mut self, bytes: &[u8]) -> Response {
        match Request::decode(bytes) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!(error = %e, "rejecting request");
                Response::from(&e)
            }
        }
    }

    /// Dispatch a request to the supervisor.
    pub async fn handle(&mut self, request: Request) -> Response {
        info!(command = request.command(), "RPC command received");
        match request {
            Request::Add(options) => match self.supervisor.add(options).await {
                Ok(_) => Response::ok(),
                Err(e) => failure(&e),
            },
            Request::Delete { names } => self.each(Op::Delete, &names).await,
            Request::Start { names } => self.each(Op::Start, &names).await,
            Request::Stop { names } => self.each(Op::Stop, &names).await,
            Request::List => match self.supervisor.list() {
                Ok(views) => list_table(&views),
                Err(e) => failure(&e),
            },
            Request::Show { name } => match self.supervisor.show(&name) {
                Ok(view) => show_table(&view, self.settings.show_passwords),
                Err(e) => failure(&e),
            },
        }
    }

    /// Apply `op` to every name; report the first failure's rc with one
    /// line per failure.
    async fn each(&mut self, op: Op, names: &[String]) -> Response {
        if names.is_empty() {
            return failure(&BmcError::Validation("at least one BMC name is required".into()));
        }
        let mut rc = 0;
        let mut lines = Vec::new();
        for name in names {
            if let Err(e) = self.apply(op, name).await {
                log_failure(&e);
                if rc == 0 {
                    rc = e.rc();
                }
                lines.push(e.to_string());
            }
        }
        if lines.is_empty() {
            Response::ok()
        } else {
            Response::errors(rc, lines)
        }
    }

    async fn apply(&mut self, op: Op, name: &str) -> BmcResult<()> {
        debug!(?op, name, "applying");
        match op {
            Op::Delete => self.supervisor.delete(name).await,
            Op::Start => self.supervisor.start(name).await,
            Op::Stop => self.supervisor.stop(name).await,
        }
    }
}

fn list_table(views: &[BmcView]) -> Response {
    let rows = views
        .iter()
        .map(|v| {
            vec![
                v.config.name.clone(),
                v.status.to_string(),
                v.config.backend_type().to_string(),
                v.config.host_address.clone(),
                v.config.port.to_string(),
            ]
        })
        .collect();
    Response::table(header(&LIST_HEADER), rows)
}

fn show_table(view: &BmcView, show_passwords: bool) -> Response {
    let rows = view
        .fields(show_passwords)
        .into_iter()
        .map(|(k, v)| vec![k, v])
        .collect();
    Response::table(header(&SHOW_HEADER), rows)
}

fn header(columns: &[&str]) -> Vec<String> {
    columns.iter().map(ToString::to_string).collect()
}

fn log_failure(e: &BmcError) {
    if e.is_user_facing() {
        warn!(rc = e.rc(), "{e}");
    } else {
        error!(rc = e.rc(), error = ?e, "unexpected failure");
    }
}

fn failure(e: &BmcError) -> Response {
    log_failure(e);
    Response::from(e)
}
