//! `vbmc add` options.

use clap::Args;
use vbmc_common::{AddOptions, BackendType};

/// Options of `vbmc add`. Unset values take their defaults in vbmcd.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Name of the new virtual BMC
    pub name: String,

    /// Kind of backend the BMC controls
    #[arg(long, value_enum)]
    pub backend_type: BackendType,

    /// Address the IPMI endpoint listens on [default: 127.0.0.1]
    #[arg(long)]
    pub address: Option<String>,

    /// UDP port of the IPMI endpoint [default: 1623]
    #[arg(long)]
    pub port: Option<u16>,

    /// IPMI username [default: admin]
    #[arg(long)]
    pub username: Option<String>,

    /// IPMI password [default: password]
    #[arg(long)]
    pub password: Option<String>,

    /// Hypervisor connection URI [default: qemu:///system]
    #[arg(long, visible_alias = "libvirt-uri", help_heading = "Hypervisor")]
    pub uri: Option<String>,

    /// Guest domain name [default: the BMC name]
    #[arg(long, help_heading = "Hypervisor")]
    pub domain_name: Option<String>,

    /// SASL username for the hypervisor connection
    #[arg(long, help_heading = "Hypervisor")]
    pub sasl_username: Option<String>,

    /// SASL password for the hypervisor connection
    #[arg(long, help_heading = "Hypervisor")]
    pub sasl_password: Option<String>,

    /// Bare-metal node id [default: the BMC name]
    #[arg(long, help_heading = "Bare metal")]
    pub node_id: Option<String>,

    /// Cloud entry of the bare-metal service [default: overcloud]
    #[arg(long, help_heading = "Bare metal")]
    pub cloud: Option<String>,

    /// Region of the bare-metal service [default: regionOne]
    #[arg(long, help_heading = "Bare metal")]
    pub region: Option<String>,
}

impl AddArgs {
    #[must_use]
    pub fn into_options(self) -> AddOptions {
        AddOptions {
            name: Some(self.name),
            backend_type: Some(self.backend_type.as_str().to_string()),
            host_address: self.address,
            port: self.port,
            username: self.username,
            password: self.password,
            uri: self.uri,
            domain_name: self.domain_name,
            sasl_username: self.sasl_username,
            sasl_password: self.sasl_password,
            node_id: self.node_id,
            cloud: self.cloud,
            region: self.region,
        }
    }
}
