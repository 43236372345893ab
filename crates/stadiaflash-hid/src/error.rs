//! Error types for the HID transport

use stadiaflash_core::Error as CoreError;
use thiserror::Error;

/// Errors that can occur when finding or opening a controller
#[derive(Debug, Error)]
pub enum HidError {
    /// No controller in any known mode is attached
    #[error("No controller found (tried flashloader 15a2:0073, OEM 18d1:9400, bootloader 18d1:946b, SDP 1fc9:0135)")]
    DeviceNotFound,

    /// Failed to enumerate or open the device
    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    /// Failed to claim the HID interface
    #[error("Failed to claim interface: {0}")]
    ClaimFailed(String),

    /// The active configuration has no HID class interface
    #[error("No HID interface in device")]
    NoHidInterface,

    /// The HID interface has no interrupt IN endpoint
    #[error("No interrupt IN endpoint on HID interface")]
    NoInEndpoint,

    /// A USB transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Core library error
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for HID transport operations
pub type Result<T> = std::result::Result<T, HidError>;

impl From<HidError> for CoreError {
    fn from(e: HidError) -> Self {
        match e {
            HidError::Core(e) => e,
            HidError::TransferFailed(msg) => CoreError::Transport(msg),
            other => CoreError::Transport(other.to_string()),
        }
    }
}
