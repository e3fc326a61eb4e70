//! Chassis and device commands answered through a [`PowerBackend`].

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::ipmi::{NETFN_APP, NETFN_CHASSIS};
use super::session::Reply;
use crate::application::ports::PowerBackend;
use crate::domain::{BootDevice, ChassisControl, PowerState};

/// Completion codes of chassis commands.
pub mod cc {
    pub const OK: u8 = 0x00;
    pub const NODE_BUSY: u8 = 0xC0;
    pub const INVALID_COMMAND: u8 = 0xC1;
    pub const INVALID_DATA: u8 = 0xCC;
    pub const PARAM_NOT_SUPPORTED: u8 = 0x80;
}

const GET_DEVICE_ID: u8 = 0x01;
const GET_CHASSIS_STATUS: u8 = 0x01;
const CHASSIS_CONTROL: u8 = 0x02;
const SET_BOOT_OPTIONS: u8 = 0x08;
const GET_BOOT_OPTIONS: u8 = 0x09;

const BOOT_PARAM_VERSION: u8 = 0x01;
const BOOT_FLAGS: u8 = 0x05;
/// Parameters accepted and ignored by Set System Boot Options.
const BOOT_PARAMS_IGNORED: [u8; 3] = [0x00, 0x03, 0x04];

/// Answer one authenticated command.
///
/// # Errors
///
/// A failed power-state query is fatal and returned as an error; every
/// other backend failure is reported as node busy.
pub async fn dispatch<B: PowerBackend>(backend: &B, net_fn: u8, cmd: u8, data: &[u8]) -> Result<Reply> {
    Ok(match (net_fn, cmd) {
        (NETFN_APP, GET_DEVICE_ID) => device_id(),
        (NETFN_CHASSIS, GET_CHASSIS_STATUS) => chassis_status(backend).await?,
        (NETFN_CHASSIS, CHASSIS_CONTROL) => chassis_control(backend, data).await,
        (NETFN_CHASSIS, GET_BOOT_OPTIONS) => get_boot_options(backend, data).await,
        (NETFN_CHASSIS, SET_BOOT_OPTIONS) => set_boot_options(backend, data).await,
        _ => (cc::INVALID_COMMAND, Vec::new()),
    })
}

fn device_id() -> Reply {
    // device id, revision, firmware 0.0, IPMI 1.5, no optional device support
    (cc::OK, vec![0x00, 0x00, 0x00, 0x00, 0x51, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
}

async fn chassis_status<B: PowerBackend>(backend: &B) -> Result<Reply> {
    let state = backend
        .get_power_state()
        .await
        .context("power state query failed")?;
    let power = u8::from(state == PowerState::On);
    Ok((cc::OK, vec![power, 0x00, 0x00]))
}

async fn chassis_control<B: PowerBackend>(backend: &B, data: &[u8]) -> Reply {
    let Some(control) = data.first().copied().and_then(ChassisControl::from_ipmi) else {
        return (cc::INVALID_DATA, Vec::new());
    };
    info!(?control, "chassis control");
    let result = match control {
        ChassisControl::Power(action) => backend.set_power_state(action).await,
        ChassisControl::DiagnosticInterrupt => backend.pulse_diagnostic_interrupt().await,
    };
    busy_on_error(result, "chassis control")
}

async fn get_boot_options<B: PowerBackend>(backend: &B, data: &[u8]) -> Reply {
    if data.first().map(|p| p & 0x7f) != Some(BOOT_FLAGS) {
        return (cc::PARAM_NOT_SUPPORTED, Vec::new());
    }
    match backend.get_boot_device().await {
        Ok(device) => (
            cc::OK,
            vec![
                BOOT_PARAM_VERSION,
                BOOT_FLAGS,
                0x80,
                BootDevice::to_boot_flags(device),
                0x00,
                0x00,
                0x00,
            ],
        ),
        Err(e) => {
            warn!(error = %e, "boot device query failed");
            (cc::NODE_BUSY, Vec::new())
        }
    }
}

async fn set_boot_options<B: PowerBackend>(backend: &B, data: &[u8]) -> Reply {
    let Some(param) = data.first().map(|p| p & 0x7f) else {
        return (cc::INVALID_DATA, Vec::new());
    };
    if BOOT_PARAMS_IGNORED.contains(&param) {
        return (cc::OK, Vec::new());
    }
    if param != BOOT_FLAGS {
        return (cc::PARAM_NOT_SUPPORTED, Vec::new());
    }
    let Some(device) = data.get(2).copied().and_then(BootDevice::from_boot_flags) else {
        return (cc::INVALID_DATA, Vec::new());
    };
    info!(?device, "set boot device");
    busy_on_error(backend.set_boot_device(device).await, "set boot device")
}

fn busy_on_error(result: Result<()>, what: &str) -> Reply {
    match result {
        Ok(()) => (cc::OK, Vec::new()),
        Err(e) => {
            warn!(error = %e, "{what} failed");
            (cc::NODE_BUSY, Vec::new())
        }
    }
}
