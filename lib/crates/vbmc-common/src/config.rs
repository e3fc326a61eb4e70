//! Process-wide configuration shared by `vbmc` and `vbmcd`.
//!
//! Loaded from `$VBMC_CONFIG` or `~/.vbmc/config.yaml`; a missing file means
//! defaults. Individual keys can then be overridden with `VBMC_*` environment
//! variables (e.g. `VBMC_SERVER_PORT=50892`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "VBMC_CONFIG";
/// Prefix of per-key environment overrides.
pub const ENV_PREFIX: &str = "VBMC_";

/// Errors raised while loading the application config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    NoHome,

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid VBMC_* environment override: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid server address {0}")]
    Address(String),
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Optional file to append log output to.
    pub logfile: Option<PathBuf>,
    /// Whether to also log to stderr.
    pub use_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            logfile: None,
            use_stderr: true,
        }
    }
}

/// IPMI listener settings handed to every worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IpmiConfig {
    /// Seconds to wait for data on one exchange.
    pub session_timeout: u64,
}

impl Default for IpmiConfig {
    fn default() -> Self {
        Self { session_timeout: 1 }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the per-instance config store.
    pub config_dir: PathBuf,
    /// Supervisor pid file. Relative paths resolve against `config_dir`.
    pub pid_file: PathBuf,
    pub server_host: String,
    pub server_port: u16,
    pub server_response_timeout_ms: u64,
    pub server_spawn_wait_ms: u64,
    pub reconcile_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub terminate_grace_ms: u64,
    /// Echo secrets unmasked in listings.
    pub show_passwords: bool,
    pub log: LogConfig,
    pub ipmi: IpmiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_dir: default_home().join(".vbmc"),
            pid_file: PathBuf::from("master.pid"),
            server_host: "127.0.0.1".to_string(),
            server_port: 50891,
            server_response_timeout_ms: 10_000,
            server_spawn_wait_ms: 3_000,
            reconcile_interval_ms: 2_000,
            probe_timeout_ms: 30_000,
            terminate_grace_ms: 5_000,
            show_passwords: false,
            log: LogConfig::default(),
            ipmi: IpmiConfig::default(),
        }
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Flat subset of settings that may be overridden from the environment.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    config_dir: Option<PathBuf>,
    pid_file: Option<PathBuf>,
    server_host: Option<String>,
    server_port: Option<u16>,
    server_response_timeout_ms: Option<u64>,
    server_spawn_wait_ms: Option<u64>,
    reconcile_interval_ms: Option<u64>,
    probe_timeout_ms: Option<u64>,
    terminate_grace_ms: Option<u64>,
    show_passwords: Option<bool>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    ipmi_session_timeout: Option<u64>,
}

impl AppConfig {
    /// Load from the default location and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(p) => PathBuf::from(p),
            None => dirs::home_dir()
                .ok_or(ConfigError::NoHome)?
                .join(".vbmc")
                .join("config.yaml"),
        };
        Self::load_from(&path, std::env::vars())
    }

    /// Load from an explicit file, then apply `VBMC_*` overrides from `env`.
    pub fn load_from(
        path: &Path,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            if content.trim().is_empty() {
                Self::default()
            } else {
                serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        } else {
            Self::default()
        };

        let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_iter(
            env.into_iter()
                .filter(|(k, _)| k != CONFIG_ENV && k.starts_with(ENV_PREFIX)),
        )?;
        config.apply(overrides);
        Ok(config)
    }

    fn apply(&mut self, o: EnvOverrides) {
        if let Some(v) = o.config_dir {
            self.config_dir = v;
        }
        if let Some(v) = o.pid_file {
            self.pid_file = v;
        }
        if let Some(v) = o.server_host {
            self.server_host = v;
        }
        if let Some(v) = o.server_port {
            self.server_port = v;
        }
        if let Some(v) = o.server_response_timeout_ms {
            self.server_response_timeout_ms = v;
        }
        if let Some(v) = o.server_spawn_wait_ms {
            self.server_spawn_wait_ms = v;
        }
        if let Some(v) = o.reconcile_interval_ms {
            self.reconcile_interval_ms = v;
        }
        if let Some(v) = o.probe_timeout_ms {
            self.probe_timeout_ms = v;
        }
        if let Some(v) = o.terminate_grace_ms {
            self.terminate_grace_ms = v;
        }
        if let Some(v) = o.show_passwords {
            self.show_passwords = v;
        }
        if let Some(v) = o.log_level {
            self.log.level = v;
        }
        if let Some(v) = o.log_file {
            self.log.logfile = Some(v);
        }
        if let Some(v) = o.ipmi_session_timeout {
            self.ipmi.session_timeout = v;
        }
    }

    /// Resolved pid file path.
    #[must_use]
    pub fn pid_path(&self) -> PathBuf {
        if self.pid_file.is_absolute() {
            self.pid_file.clone()
        } else {
            self.config_dir.join(&self.pid_file)
        }
    }

    /// Address the supervisor listens on and the client connects to.
    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self.server_host.trim_start_matches('[').trim_end_matches(']');
        let literal = if host.contains(':') {
            format!("[{host}]:{}", self.server_port)
        } else {
            format!("{host}:{}", self.server_port)
        };
        literal
            .parse()
            .map_err(|_| ConfigError::Address(literal.clone()))
    }

    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.server_response_timeout_ms)
    }

    #[must_use]
    pub fn spawn_wait(&self) -> Duration {
        Duration::from_millis(self.server_spawn_wait_ms)
    }

    #[must_use]
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms.max(1))
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    #[must_use]
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.ipmi.session_timeout.max(1))
    }
}
