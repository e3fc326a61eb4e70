//! Worker process runtime: one IPMI LAN endpoint for one BMC instance.
//!
//! Started by the supervisor as `vbmcd _worker <name>`. The worker loads its
//! config from the store, binds `host_address:port` over UDP and answers
//! requests until it is killed or a power-state query fails.

pub mod dispatch;
pub mod ipmi;
pub mod session;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::{Instrument, debug, info, info_span, warn};
use vbmc_common::{BackendSpec, BmcConfig};

use crate::application::ports::{ConfigStore, PowerBackend};
use crate::infra::backend::{IronicBackend, LibvirtBackend};
use crate::infra::command_runner::DEFAULT_CMD_TIMEOUT;
use crate::infra::process::die_with_parent;
use crate::infra::store::IniConfigStore;

use self::ipmi::{NETFN_APP, Request, SessionHeader};
use self::session::{Reply, SessionTable};

const GET_CHANNEL_AUTH_CAPS: u8 = 0x38;
const GET_SESSION_CHALLENGE: u8 = 0x39;
const ACTIVATE_SESSION: u8 = 0x3A;
const SET_SESSION_PRIVILEGE: u8 = 0x3B;
const CLOSE_SESSION: u8 = 0x3C;

/// Idle time after which an activated session is dropped.
const SESSION_IDLE: Duration = Duration::from_secs(60);
/// Minimum spacing between two sweeps of expired sessions and challenges.
const PRUNE_INTERVAL: Duration = Duration::from_secs(1);
const MAX_PACKET: usize = 1024;

/// Arguments of the hidden worker subcommand.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub name: String,
    pub config_dir: PathBuf,
    pub session_timeout: Duration,
}

/// Run the worker for one instance until a fatal error.
///
/// # Errors
///
/// Fails if the config cannot be loaded, the socket cannot be bound, or a
/// power-state query fails.
pub async fn run(opts: WorkerOptions) -> Result<()> {
    let span = info_span!("worker", name = %opts.name);
    async move {
        die_with_parent()?;
        let store = IniConfigStore::new(&opts.config_dir);
        let config = store
            .load(&opts.name)
            .with_context(|| format!("loading config of BMC instance '{}'", opts.name))?;
        let socket = UdpSocket::bind((config.host_address.as_str(), config.port))
            .await
            .with_context(|| format!("binding {}:{}", config.host_address, config.port))?;
        info!(
            backend_type = config.backend_type().as_str(),
            pid = std::process::id(),
            address = %config.host_address,
            port = config.port,
            "worker started"
        );

        match &config.backend {
            BackendSpec::Hypervisor(spec) => {
                let backend = LibvirtBackend::connect(spec, DEFAULT_CMD_TIMEOUT)?;
                serve(socket, Bmc::new(&config, backend), opts.session_timeout).await
            }
            BackendSpec::BareMetal(spec) => {
                let backend = IronicBackend::connect(spec, DEFAULT_CMD_TIMEOUT);
                serve(socket, Bmc::new(&config, backend), opts.session_timeout).await
            }
        }
    }
    .instrument(span)
    .await
}

async fn serve<B: PowerBackend>(socket: UdpSocket, mut bmc: Bmc<B>, recv_timeout: Duration) -> Result<()> {
    let mut buf = [0u8; MAX_PACKET];
    loop {
        match tokio::time::timeout(recv_timeout, socket.recv_from(&mut buf)).await {
            Err(_) => {}
            Ok(Err(e)) => return Err(e).context("receiving IPMI packet"),
            Ok(Ok((len, peer))) => {
                if let Some(reply) = bmc.handle(&buf[..len]).await? {
                    if let Err(e) = socket.send_to(&reply, peer).await {
                        warn!(%peer, error = %e, "failed to send IPMI reply");
                    }
                }
            }
        }
        bmc.maintain(Instant::now());
    }
}

/// Protocol state of one emulated BMC, independent of the socket.
pub struct Bmc<B> {
    backend: B,
    sessions: SessionTable,
    last_prune: Instant,
}

impl<B: PowerBackend> Bmc<B> {
    pub fn new(config: &BmcConfig, backend: B) -> Self {
        Self {
            backend,
            sessions: SessionTable::new(&config.username, &config.password, SESSION_IDLE),
            last_prune: Instant::now(),
        }
    }

    /// Expire idle sessions and challenges, at most once per [`PRUNE_INTERVAL`].
    pub fn maintain(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_prune) < PRUNE_INTERVAL {
            return;
        }
        self.last_prune = now;
        self.sessions.prune(now);
        debug!(
            sessions = self.sessions.len(),
            challenges = self.sessions.pending_challenges(),
            "session table pruned"
        );
    }

    /// Answer one packet. `Ok(None)` drops it without a reply.
    ///
    /// # Errors
    ///
    /// Propagates fatal dispatch failures.
    pub async fn handle(&mut self, packet: &[u8]) -> Result<Option<Vec<u8>>> {
        let request = match ipmi::decode(packet) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "dropping packet");
                return Ok(None);
            }
        };

        if request.net_fn == NETFN_APP {
            let unauthenticated = SessionHeader::unauthenticated();
            match request.cmd {
                GET_CHANNEL_AUTH_CAPS => {
                    let result = SessionTable::auth_capabilities(&request.data);
                    return Ok(Some(respond(&request, &unauthenticated, result)));
                }
                GET_SESSION_CHALLENGE => {
                    let result = self.sessions.challenge(&request.data);
                    return Ok(Some(respond(&request, &unauthenticated, result)));
                }
                ACTIVATE_SESSION => {
                    return Ok(self
                        .sessions
                        .activate(&request.session, &request.data)
                        .map(|(header, result)| respond(&request, &header, result)));
                }
                _ => {}
            }
        }

        let Some(header) = self.sessions.authenticate(&request.session) else {
            debug!(cmd = request.cmd, "request outside an active session");
            let result = (session::cc::INSUFFICIENT_PRIVILEGE, Vec::new());
            return Ok(Some(respond(&request, &SessionHeader::unauthenticated(), result)));
        };

        let result = match (request.net_fn, request.cmd) {
            (NETFN_APP, SET_SESSION_PRIVILEGE) => {
                self.sessions.set_privilege(header.session_id, &request.data)
            }
            (NETFN_APP, CLOSE_SESSION) => self.sessions.close(&request.data),
            (net_fn, cmd) => dispatch::dispatch(&self.backend, net_fn, cmd, &request.data).await?,
        };
        Ok(Some(respond(&request, &header, result)))
    }
}

fn respond(request: &Request, header: &SessionHeader, (completion, data): Reply) -> Vec<u8> {
    ipmi::encode_response(request, header, completion, &data)
}
