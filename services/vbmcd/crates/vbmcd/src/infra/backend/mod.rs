//! Backend adapters reached through their command-line front-ends.

pub mod ironic;
pub mod libvirt;

use std::time::Duration;

use vbmc_common::{BackendSpec, BmcConfig, BmcError, BmcResult};

use crate::application::ports::BackendProbe;

pub use ironic::IronicBackend;
pub use libvirt::LibvirtBackend;

/// Pre-flight probe: the hypervisor must answer and know the domain.
///
/// Bare-metal instances are not probed.
#[derive(Debug, Clone, Copy)]
pub struct CliBackendProbe {
    timeout: Duration,
}

impl CliBackendProbe {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl BackendProbe for CliBackendProbe {
    async fn probe(&self, config: &BmcConfig) -> BmcResult<()> {
        match &config.backend {
            BackendSpec::Hypervisor(spec) => {
                let backend = LibvirtBackend::connect(spec, self.timeout)
                    .map_err(|e| BmcError::BackendUnreachable(format!("{e:#}")))?;
                backend.check_domain().await.map_err(|e| {
                    BmcError::BackendUnreachable(format!(
                        "domain '{}' at {}: {e:#}",
                        spec.domain_name, spec.uri
                    ))
                })
            }
            BackendSpec::BareMetal(_) => Ok(()),
        }
    }
}
