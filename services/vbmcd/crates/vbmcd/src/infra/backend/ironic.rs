//! Bare-metal backend driven through `openstack baremetal`.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;
use vbmc_common::BareMetalSpec;

use crate::application::ports::{CommandRunner, PowerBackend};
use crate::domain::{BootDevice, PowerAction, PowerState};
use crate::infra::command_runner::{TokioCommandRunner, failure_text};

const OPENSTACK: &str = "openstack";

/// An ironic node addressed by id within a cloud/region.
pub struct IronicBackend<R> {
    runner: R,
    node_id: String,
    cloud: String,
    region: String,
}

#[derive(Debug, Deserialize)]
struct BootDeviceInfo {
    boot_device: Option<String>,
}

impl IronicBackend<TokioCommandRunner> {
    #[must_use]
    pub fn connect(spec: &BareMetalSpec, timeout: Duration) -> Self {
        Self::new(TokioCommandRunner::new(timeout), spec)
    }
}

impl<R: CommandRunner> IronicBackend<R> {
    pub fn new(runner: R, spec: &BareMetalSpec) -> Self {
        Self {
            runner,
            node_id: spec.node_id.clone(),
            cloud: spec.cloud.clone(),
            region: spec.region.clone(),
        }
    }

    /// Run `openstack --os-cloud C --os-region-name R baremetal node <args>`.
    async fn node(&self, args: &[&str]) -> Result<String> {
        let mut full = vec![
            "--os-cloud",
            self.cloud.as_str(),
            "--os-region-name",
            self.region.as_str(),
            "baremetal",
            "node",
        ];
        full.extend_from_slice(args);
        debug!(node = %self.node_id, args = ?args, "openstack baremetal node");
        let output = self.runner.run(OPENSTACK, &full).await?;
        if !output.status.success() {
            bail!(
                "openstack baremetal node {} failed: {}",
                args.join(" "),
                failure_text(&output)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn ironic_device(device: BootDevice) -> &'static str {
    match device {
        BootDevice::Network => "pxe",
        BootDevice::Hd => "disk",
        BootDevice::Optical => "cdrom",
    }
}

impl<R: CommandRunner> PowerBackend for IronicBackend<R> {
    async fn get_power_state(&self) -> Result<PowerState> {
        let node = self.node_id.as_str();
        let state = self
            .node(&["show", node, "-f", "value", "-c", "power_state"])
            .await?;
        Ok(if state.trim() == "power on" {
            PowerState::On
        } else {
            PowerState::Off
        })
    }

    async fn set_power_state(&self, action: PowerAction) -> Result<()> {
        let node = self.node_id.as_str();
        let args: &[&str] = match action {
            PowerAction::On => &["power", "on", node],
            PowerAction::Off => &["power", "off", node],
            PowerAction::SoftOff => &["power", "off", "--soft", node],
            PowerAction::Reset | PowerAction::Cycle => &["reboot", node],
        };
        self.node(args).await.map(|_| ())
    }

    async fn get_boot_device(&self) -> Result<Option<BootDevice>> {
        let node = self.node_id.as_str();
        let out = self
            .node(&["boot", "device", "show", node, "-f", "json"])
            .await?;
        let info: BootDeviceInfo =
            serde_json::from_str(&out).context("parsing boot device from openstack")?;
        Ok(match info.boot_device.as_deref() {
            Some("pxe") => Some(BootDevice::Network),
            Some("disk") => Some(BootDevice::Hd),
            Some("cdrom") => Some(BootDevice::Optical),
            _ => None,
        })
    }

    async fn set_boot_device(&self, device: BootDevice) -> Result<()> {
        let node = self.node_id.as_str();
        self.node(&["boot", "device", "set", node, ironic_device(device)])
            .await
            .map(|_| ())
    }

    async fn pulse_diagnostic_interrupt(&self) -> Result<()> {
        bail!("diagnostic interrupt is not supported for bare-metal nodes")
    }
}
