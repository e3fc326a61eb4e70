//! Hypervisor backend driven through `virsh`.

use std::io::Write;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::debug;
use vbmc_common::{HypervisorSpec, SaslCredentials};

use crate::application::ports::{CommandRunner, PowerBackend};
use crate::domain::{BootDevice, PowerAction, PowerState};
use crate::infra::command_runner::{TokioCommandRunner, failure_text};

const VIRSH: &str = "virsh";

static OS_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?s)<os\b[^>]*>(.*?)</os>").expect("valid regex")
});

static OS_BOOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"<boot\s+dev\s*=\s*['"]([^'"]+)['"]"#).expect("valid regex")
});

/// Every `<boot .../>` element, under `<os>` or under a device.
static ANY_BOOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\s*<boot\b[^>]*/>").expect("valid regex")
});

static OS_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\s*</os>").expect("valid regex")
});

/// A libvirt domain controlled through `virsh -c <uri>`.
pub struct LibvirtBackend<R> {
    runner: R,
    uri: String,
    domain: String,
    /// Keeps the SASL auth file alive as long as the backend.
    _auth_file: Option<NamedTempFile>,
}

impl LibvirtBackend<TokioCommandRunner> {
    /// Build a backend with a real runner. SASL credentials are handed to
    /// libvirt through a private auth file.
    pub fn connect(spec: &HypervisorSpec, timeout: Duration) -> Result<Self> {
        let mut runner = TokioCommandRunner::new(timeout);
        let auth_file = match &spec.sasl {
            Some(credentials) => {
                let file = write_auth_file(credentials)?;
                runner = runner.with_env("LIBVIRT_AUTH_FILE", file.path().display().to_string());
                Some(file)
            }
            None => None,
        };
        Ok(Self {
            runner,
            uri: spec.uri.clone(),
            domain: spec.domain_name.clone(),
            _auth_file: auth_file,
        })
    }
}

fn write_auth_file(credentials: &SaslCredentials) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("vbmc-libvirt-auth-")
        .tempfile()
        .context("creating libvirt auth file")?;
    write!(
        file,
        "[credentials-vbmc]\nauthname={}\npassword={}\n\n[auth-libvirt-default]\ncredentials=vbmc\n",
        credentials.username, credentials.password
    )
    .context("writing libvirt auth file")?;
    file.flush().context("writing libvirt auth file")?;
    Ok(file)
}

impl<R: CommandRunner> LibvirtBackend<R> {
    pub fn new(runner: R, spec: &HypervisorSpec) -> Self {
        Self {
            runner,
            uri: spec.uri.clone(),
            domain: spec.domain_name.clone(),
            _auth_file: None,
        }
    }

    async fn virsh(&self, readonly: bool, args: &[&str]) -> Result<String> {
        let mut full: Vec<&str> = Vec::with_capacity(args.len() + 3);
        if readonly {
            full.push("-r");
        }
        full.extend(["-c", self.uri.as_str()]);
        full.extend_from_slice(args);
        debug!(uri = %self.uri, domain = %self.domain, args = ?args, "virsh");
        let output = self.runner.run(VIRSH, &full).await?;
        if !output.status.success() {
            bail!("virsh {} failed: {}", args.join(" "), failure_text(&output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Current `domstate` string, e.g. `running` or `shut off`.
    async fn domain_state(&self) -> Result<String> {
        let out = self.virsh(true, &["domstate", self.domain.as_str()]).await?;
        Ok(out.trim().to_string())
    }

    /// Fails unless the hypervisor answers and the domain exists.
    pub async fn check_domain(&self) -> Result<()> {
        self.domain_state().await.map(|_| ())
    }

    async fn is_active(&self) -> Result<bool> {
        let state = self.domain_state().await?;
        Ok(!matches!(state.as_str(), "shut off" | "crashed"))
    }

    async fn domain_op(&self, op: &str) -> Result<()> {
        self.virsh(false, &[op, self.domain.as_str()]).await.map(|_| ())
    }
}

/// Boot device named by the first `<boot dev=…/>` under `<os>`.
fn boot_device_from_xml(xml: &str) -> Option<BootDevice> {
    let os = OS_RE.captures(xml)?.get(1)?.as_str();
    let dev = OS_BOOT_RE.captures(os)?.get(1)?.as_str();
    match dev {
        "network" => Some(BootDevice::Network),
        "hd" => Some(BootDevice::Hd),
        "cdrom" => Some(BootDevice::Optical),
        _ => None,
    }
}

fn libvirt_device(device: BootDevice) -> &'static str {
    match device {
        BootDevice::Network => "network",
        BootDevice::Hd => "hd",
        BootDevice::Optical => "cdrom",
    }
}

/// Drop every `<boot>` element (they are mutually exclusive between `<os>`
/// and devices) and add a single one under `<os>`.
fn set_boot_device_in_xml(xml: &str, device: BootDevice) -> Result<String> {
    if !OS_CLOSE_RE.is_match(xml) {
        bail!("domain XML has no <os> element");
    }
    let stripped = ANY_BOOT_RE.replace_all(xml, "");
    let boot = format!("\n    <boot dev='{}'/>\n  </os>", libvirt_device(device));
    Ok(OS_CLOSE_RE.replacen(&stripped, 1, boot.as_str()).into_owned())
}

impl<R: CommandRunner> PowerBackend for LibvirtBackend<R> {
    async fn get_power_state(&self) -> Result<PowerState> {
        Ok(if self.is_active().await? {
            PowerState::On
        } else {
            PowerState::Off
        })
    }

    async fn set_power_state(&self, action: PowerAction) -> Result<()> {
        let active = self.is_active().await?;
        match action {
            PowerAction::On if !active => self.domain_op("start").await,
            PowerAction::Off if active => self.domain_op("destroy").await,
            PowerAction::SoftOff if active => self.domain_op("shutdown").await,
            PowerAction::Reset if active => self.domain_op("reset").await,
            PowerAction::Cycle => {
                if active {
                    self.domain_op("destroy").await?;
                }
                self.domain_op("start").await
            }
            _ => Ok(()),
        }
    }

    async fn get_boot_device(&self) -> Result<Option<BootDevice>> {
        let xml = self.virsh(true, &["dumpxml", self.domain.as_str()]).await?;
        Ok(boot_device_from_xml(&xml))
    }

    async fn set_boot_device(&self, device: BootDevice) -> Result<()> {
        let xml = self
            .virsh(false, &["dumpxml", "--security-info", self.domain.as_str()])
            .await?;
        let updated = set_boot_device_in_xml(&xml, device)?;

        let args = ["-c", self.uri.as_str(), "define", "/dev/stdin"];
        let output = self
            .runner
            .run_with_stdin(VIRSH, &args, updated.as_bytes())
            .await?;
        if !output.status.success() {
            bail!("virsh define failed: {}", failure_text(&output));
        }
        Ok(())
    }

    async fn pulse_diagnostic_interrupt(&self) -> Result<()> {
        if self.is_active().await? {
            self.domain_op("inject-nmi").await?;
        }
        Ok(())
    }
}
