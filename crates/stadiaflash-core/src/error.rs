//! Error types for stadiaflash-core
//!
//! Every failure that can abort a flashing run is represented by a variant
//! of [`Error`]. Callers that want to react per category (print a hint,
//! retry, give up) should match on [`Error::kind`] rather than on the
//! individual variants.

use core::fmt;

use thiserror::Error;

use crate::mode::{DeviceMode, UsbId};

/// Details about an invalid build info record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ImageError {
    /// Image is too short to contain the record being read
    #[error("image is {len} bytes, need at least {needed}")]
    Truncated {
        /// Bytes required to parse the record
        needed: usize,
        /// Actual image length
        len: usize,
    },
    /// Build info header magic mismatch
    #[error("expected build info header 0x747315A2, got 0x{0:08X}")]
    BadHeader(u32),
    /// Build info size field mismatch
    #[error("expected build info size 0x100, got 0x{0:X}")]
    BadSize(u32),
    /// Build info footer magic mismatch
    #[error("expected build info footer 0x4786CD88, got 0x{0:08X}")]
    BadFooter(u32),
}

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The attached device is in a different mode than the client needs
    #[error("device {found} is not in {expected} mode")]
    DeviceIdentityMismatch {
        /// Mode the client requires
        expected: DeviceMode,
        /// VID/PID reported by the device
        found: UsbId,
    },
    /// No report arrived within the read timeout
    #[error("timed out waiting for the device, try replugging it")]
    Timeout,
    /// USB transfer failed
    #[error("USB transfer failed: {0}")]
    Transport(String),
    /// The background receiver stopped after a hardware error
    #[error("report receiver stopped: {0}")]
    ReceiverStopped(String),
    /// The flashloader reported a non-zero status
    #[error("command 0x{tag:02X} failed with status 0x{status:X}")]
    CommandFailed {
        /// Status code from the response
        status: u32,
        /// Tag of the command that failed
        tag: u8,
    },
    /// A frame did not match the wire format
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// A memory read returned fewer bytes than requested
    #[error("short read at 0x{address:08X}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Start address of the read
        address: u32,
        /// Requested length
        expected: usize,
        /// Received length
        actual: usize,
    },
    /// The firmware image has an invalid build info record
    #[error("invalid firmware image: {0}")]
    InvalidImage(#[from] ImageError),
    /// The MCU silicon id is not in the table of supported parts
    #[error("unsupported MCU id 0x{0:X}")]
    UnknownMcu(u32),
    /// The flash vendor id is not in the table of supported parts
    #[error("unsupported flash id 0x{0:04X}")]
    UnknownFlash(u32),
    /// A flash part name given by the user is not known
    #[error("unknown flash part '{0}'")]
    UnknownFlashName(String),
    /// The reset handler address is outside all known partitions
    #[error("cannot determine partition for reset handler 0x{0:08X}")]
    NoMatchingPartition(u32),
}

/// Error categories a caller can act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Device is in the wrong mode (construction time)
    DeviceIdentityMismatch,
    /// A read timed out; the call failed but the session may still be usable
    TransportTimeout,
    /// USB failure; the session is unusable
    TransportHardwareFailure,
    /// The device rejected a command
    CommandFailed,
    /// Frames did not follow the wire format
    ProtocolViolation,
    /// Bad magic, size or footer in the firmware build info
    ImageFormatInvalid,
    /// Unrecognized MCU or flash part
    UnknownHardware,
    /// Reset handler address outside all partitions
    NoMatchingPartition,
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceIdentityMismatch { .. } => ErrorKind::DeviceIdentityMismatch,
            Self::Timeout => ErrorKind::TransportTimeout,
            Self::Transport(_) | Self::ReceiverStopped(_) => ErrorKind::TransportHardwareFailure,
            Self::CommandFailed { .. } => ErrorKind::CommandFailed,
            Self::MalformedResponse(_) | Self::ShortRead { .. } => ErrorKind::ProtocolViolation,
            Self::InvalidImage(_) => ErrorKind::ImageFormatInvalid,
            Self::UnknownMcu(_) | Self::UnknownFlash(_) | Self::UnknownFlashName(_) => {
                ErrorKind::UnknownHardware
            }
            Self::NoMatchingPartition(_) => ErrorKind::NoMatchingPartition,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DeviceIdentityMismatch => "wrong device mode",
            Self::TransportTimeout => "device timed out",
            Self::TransportHardwareFailure => "USB failure",
            Self::CommandFailed => "command failed",
            Self::ProtocolViolation => "protocol violation",
            Self::ImageFormatInvalid => "invalid firmware image",
            Self::UnknownHardware => "unsupported hardware",
            Self::NoMatchingPartition => "no matching partition",
        };
        f.write_str(s)
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
