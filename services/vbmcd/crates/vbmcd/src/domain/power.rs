//! Power and boot-device vocabulary shared by the IPMI dispatcher and the
//! backend adapters.

/// Chassis power state as reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

/// A power change requested through Chassis Control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Hard power off.
    Off,
    On,
    /// Off, then on.
    Cycle,
    /// Hard reset without cycling power.
    Reset,
    /// ACPI soft shutdown.
    SoftOff,
}

/// Chassis Control request byte, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChassisControl {
    Power(PowerAction),
    DiagnosticInterrupt,
}

impl ChassisControl {
    /// Decode the low nibble of the Chassis Control request.
    #[must_use]
    pub fn from_ipmi(byte: u8) -> Option<Self> {
        match byte & 0x0f {
            0x00 => Some(Self::Power(PowerAction::Off)),
            0x01 => Some(Self::Power(PowerAction::On)),
            0x02 => Some(Self::Power(PowerAction::Cycle)),
            0x03 => Some(Self::Power(PowerAction::Reset)),
            0x04 => Some(Self::DiagnosticInterrupt),
            0x05 => Some(Self::Power(PowerAction::SoftOff)),
            _ => None,
        }
    }
}

/// Boot devices a BMC instance can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDevice {
    Network,
    Hd,
    Optical,
}

impl BootDevice {
    /// Decode the device selector from boot flags data byte 2 (bits 5:2).
    #[must_use]
    pub fn from_boot_flags(byte: u8) -> Option<Self> {
        match (byte >> 2) & 0x0f {
            0x01 => Some(Self::Network),
            0x02 => Some(Self::Hd),
            0x05 => Some(Self::Optical),
            _ => None,
        }
    }

    /// Encode as boot flags data byte 2. No override encodes as zero.
    #[must_use]
    pub fn to_boot_flags(device: Option<Self>) -> u8 {
        match device {
            Some(Self::Network) => 0x04,
            Some(Self::Hd) => 0x08,
            Some(Self::Optical) => 0x14,
            None => 0x00,
        }
    }
}
