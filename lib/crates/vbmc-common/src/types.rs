use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BmcError, BmcResult};

/// Placeholder printed in place of secrets when passwords are hidden.
pub const MASKED_SECRET: &str = "***";

pub const DEFAULT_HOST_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1623;
pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "password";
pub const DEFAULT_HYPERVISOR_URI: &str = "qemu:///system";
pub const DEFAULT_CLOUD: &str = "overcloud";
pub const DEFAULT_REGION: &str = "regionOne";

/// Which kind of backend a BMC instance fronts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum BackendType {
    /// A guest of a virtualization hypervisor (libvirt).
    #[serde(alias = "libvirt")]
    #[cfg_attr(feature = "clap", value(alias = "libvirt"))]
    Hypervisor,
    /// A node of a bare-metal management service (ironic).
    #[serde(alias = "ironic")]
    #[cfg_attr(feature = "clap", value(alias = "ironic"))]
    BareMetal,
}

impl BackendType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hypervisor => "hypervisor",
            Self::BareMetal => "bare-metal",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hypervisor" | "libvirt" => Ok(Self::Hypervisor),
            "bare-metal" | "ironic" => Ok(Self::BareMetal),
            other => Err(BmcError::Validation(format!(
                "unknown backend type '{other}' (expected hypervisor or bare-metal)"
            ))),
        }
    }
}

/// SASL credentials for a hypervisor connection. Always a complete pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslCredentials {
    pub username: String,
    pub password: String,
}

/// Fields specific to the hypervisor backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypervisorSpec {
    pub uri: String,
    pub domain_name: String,
    pub sasl: Option<SaslCredentials>,
}

/// Fields specific to the bare-metal backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BareMetalSpec {
    pub node_id: String,
    pub cloud: String,
    pub region: String,
}

/// Backend field group, keyed by backend type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSpec {
    Hypervisor(HypervisorSpec),
    BareMetal(BareMetalSpec),
}

impl BackendSpec {
    #[must_use]
    pub fn backend_type(&self) -> BackendType {
        match self {
            Self::Hypervisor(_) => BackendType::Hypervisor,
            Self::BareMetal(_) => BackendType::BareMetal,
        }
    }

    /// Flat `(key, value)` pairs for this backend's fields. Unset optional
    /// fields are reported as empty strings.
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Hypervisor(h) => {
                let (user, pass) = h
                    .sasl
                    .as_ref()
                    .map(|s| (s.username.clone(), s.password.clone()))
                    .unwrap_or_default();
                vec![
                    ("uri", h.uri.clone()),
                    ("domain_name", h.domain_name.clone()),
                    ("sasl_username", user),
                    ("sasl_password", pass),
                ]
            }
            Self::BareMetal(b) => vec![
                ("node_id", b.node_id.clone()),
                ("cloud", b.cloud.clone()),
                ("region", b.region.clone()),
            ],
        }
    }
}

/// Persistent configuration of one BMC instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmcConfig {
    pub name: String,
    /// Desired run state. Only `start`/`stop` change it.
    pub enabled: bool,
    pub host_address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub backend: BackendSpec,
}

impl BmcConfig {
    #[must_use]
    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    /// Common fields as flat `(key, value)` pairs.
    #[must_use]
    pub fn common_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("backend_type", self.backend_type().to_string()),
            ("enabled", self.enabled.to_string()),
            ("host_address", self.host_address.clone()),
            ("port", self.port.to_string()),
            ("username", self.username.clone()),
            ("password", self.password.clone()),
        ]
    }

    /// Common fields merged with the active backend's fields. The inactive
    /// backend's fields never appear.
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = self.common_fields();
        fields.extend(self.backend.fields());
        fields
    }
}

/// Observed run state of an instance's worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BmcStatus {
    /// A live worker process exists.
    Running,
    /// A worker handle exists but its process has exited.
    Error,
    /// No worker handle exists.
    Down,
}

impl BmcStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Error => "error",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for BmcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instance as presented by `list` and `show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmcView {
    pub config: BmcConfig,
    pub status: BmcStatus,
}

impl BmcView {
    /// All fields plus `status`, with secrets masked unless `show_passwords`.
    #[must_use]
    pub fn fields(&self, show_passwords: bool) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = self
            .config
            .fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), mask_secret(k, v, show_passwords)))
            .collect();
        fields.push(("status".to_string(), self.status.to_string()));
        fields
    }
}

/// Replace the value of any password-like field with [`MASKED_SECRET`].
#[must_use]
pub fn mask_secret(key: &str, value: String, show_passwords: bool) -> String {
    if !show_passwords && key.contains("password") {
        MASKED_SECRET.to_string()
    } else {
        value
    }
}

/// Check that `name` can serve as an instance identifier and directory name.
pub fn validate_name(name: &str) -> BmcResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name.len() <= 255
        && name
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && c != '/' && c != '\\');
    if valid {
        Ok(())
    } else {
        Err(BmcError::Validation(format!("invalid BMC name '{name}'")))
    }
}

/// Options accepted by `add`, before defaults are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AddOptions {
    pub name: Option<String>,
    pub backend_type: Option<String>,
    pub host_address: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub uri: Option<String>,
    pub domain_name: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub node_id: Option<String>,
    pub cloud: Option<String>,
    pub region: Option<String>,
}

/// Treat empty strings the same as absent values.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl AddOptions {
    /// Validate the options and build the config to persist.
    ///
    /// New instances are always disabled; activation takes an explicit `start`.
    pub fn into_config(self) -> BmcResult<BmcConfig> {
        let backend_type: BackendType = present(self.backend_type)
            .ok_or_else(|| BmcError::Validation("backend type is required".into()))?
            .parse()?;
        let name = present(self.name)
            .ok_or_else(|| BmcError::Validation("BMC name is required".into()))?;
        validate_name(&name)?;

        let port = self.port.unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(BmcError::Validation("port must be between 1 and 65535".into()));
        }

        let backend = match backend_type {
            BackendType::Hypervisor => {
                reject_foreign(
                    backend_type,
                    &[
                        ("node_id", &self.node_id),
                        ("cloud", &self.cloud),
                        ("region", &self.region),
                    ],
                )?;
                let sasl = match (present(self.sasl_username), present(self.sasl_password)) {
                    (Some(username), Some(password)) => Some(SaslCredentials { username, password }),
                    (None, None) => None,
                    _ => {
                        return Err(BmcError::Validation(
                            "SASL username and password must be given together".into(),
                        ));
                    }
                };
                BackendSpec::Hypervisor(HypervisorSpec {
                    uri: present(self.uri).unwrap_or_else(|| DEFAULT_HYPERVISOR_URI.into()),
                    domain_name: present(self.domain_name).unwrap_or_else(|| name.clone()),
                    sasl,
                })
            }
            BackendType::BareMetal => {
                reject_foreign(
                    backend_type,
                    &[
                        ("uri", &self.uri),
                        ("domain_name", &self.domain_name),
                        ("sasl_username", &self.sasl_username),
                        ("sasl_password", &self.sasl_password),
                    ],
                )?;
                BackendSpec::BareMetal(BareMetalSpec {
                    node_id: present(self.node_id).unwrap_or_else(|| name.clone()),
                    cloud: present(self.cloud).unwrap_or_else(|| DEFAULT_CLOUD.into()),
                    region: present(self.region).unwrap_or_else(|| DEFAULT_REGION.into()),
                })
            }
        };

        Ok(BmcConfig {
            name,
            enabled: false,
            host_address: present(self.host_address)
                .unwrap_or_else(|| DEFAULT_HOST_ADDRESS.into()),
            port,
            username: present(self.username).unwrap_or_else(|| DEFAULT_USERNAME.into()),
            password: present(self.password).unwrap_or_else(|| DEFAULT_PASSWORD.into()),
            backend,
        })
    }
}

fn reject_foreign(backend_type: BackendType, fields: &[(&str, &Option<String>)]) -> BmcResult<()> {
    let foreign: Vec<&str> = fields
        .iter()
        .filter(|(_, v)| v.as_deref().is_some_and(|v| !v.is_empty()))
        .map(|(k, _)| *k)
        .collect();
    if foreign.is_empty() {
        Ok(())
    } else {
        Err(BmcError::Validation(format!(
            "option(s) {} not valid for backend type {backend_type}",
            foreign.join(", ")
        )))
    }
}
