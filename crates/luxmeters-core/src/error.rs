//! Error types
//!
//! Transport failures, device-reported faults and malformed frames are kept
//! apart so callers can decide what is fatal and what is worth another try.

use thiserror::Error;

/// Operator remediation text for the CL-200A "power cycle" error codes.
pub const POWER_CYCLE_ADVICE: &str = "Switch off the CL-200A and then switch it back on";

/// Errors raised by the serial transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Could not open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port is closed")]
    Closed,

    #[error("No serial port found for {0}")]
    PortNotFound(String),
}

/// Faults reported by the instrument itself. All of them need operator action.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    /// Error code 1, 2 or 3 in a CL-200A response
    #[error("CL-200A reported error code {code}. {}", POWER_CYCLE_ADVICE)]
    PowerCycleRequired { code: char },

    #[error("Battery is low. Charge or replace the batteries.")]
    LowBattery,

    /// EXT mode still rejected after re-entering hold mode
    #[error("CL-200A refused EXT mode after re-entering hold mode. {}", POWER_CYCLE_ADVICE)]
    ExtModeRejected,
}

/// Non-fatal measurement conditions; the value is still delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeWarning {
    /// Error code 5: the measurement exceeds the meter's range
    OverRange,
    /// Error code 6: low luminance region, accuracy decreases
    LowLuminance,
}

impl std::fmt::Display for RangeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeWarning::OverRange => {
                write!(f, "Measurement value over error: outside the CL-200A measurement range")
            }
            RangeWarning::LowLuminance => {
                write!(f, "Low luminance error: accuracy decreases in this region")
            }
        }
    }
}

/// Top-level error for every driver operation
#[derive(Error, Debug)]
pub enum LuxError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Device error: {0}")]
    Device(DeviceFault),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Driver is faulted after an earlier failure; reconnect the device")]
    Faulted,

    #[error("{model} does not support {capability}")]
    Unsupported {
        model: &'static str,
        capability: &'static str,
    },

    #[error("Invalid LCD segment table: {0}")]
    InvalidTable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl From<DeviceFault> for LuxError {
    fn from(fault: DeviceFault) -> Self {
        LuxError::Device(fault)
    }
}

impl From<serialport::Error> for LuxError {
    fn from(e: serialport::Error) -> Self {
        LuxError::Transport(TransportError::Serial(e))
    }
}

impl LuxError {
    /// True when the failure came from the transport (port unplugged, closed, ...)
    pub fn is_transport(&self) -> bool {
        matches!(self, LuxError::Transport(_))
    }
}
