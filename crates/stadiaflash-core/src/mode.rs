//! USB personalities of the controller
//!
//! The controller enumerates with a different VID/PID depending on which
//! code is running: the boot ROM (SDP), the RAM-resident flashloader, the
//! application firmware (OEM) or the second stage bootloader.

use core::fmt;

/// A USB vendor/product id pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbId {
    /// Vendor id
    pub vid: u16,
    /// Product id
    pub pid: u16,
}

impl UsbId {
    /// Create a new id pair
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Mode the controller is currently running in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceMode {
    /// Boot ROM serial download protocol
    Sdp,
    /// Vendor flashloader running from RAM
    Flashloader,
    /// Application firmware
    Oem,
    /// Second stage bootloader
    Bootloader,
}

impl DeviceMode {
    /// All modes, in discovery priority order
    pub const ALL: [DeviceMode; 4] = [
        DeviceMode::Flashloader,
        DeviceMode::Oem,
        DeviceMode::Bootloader,
        DeviceMode::Sdp,
    ];

    /// USB ids the device enumerates with in this mode
    pub const fn usb_id(self) -> UsbId {
        match self {
            DeviceMode::Sdp => UsbId::new(0x1FC9, 0x0135),
            DeviceMode::Flashloader => UsbId::new(0x15A2, 0x0073),
            DeviceMode::Oem => UsbId::new(0x18D1, 0x9400),
            DeviceMode::Bootloader => UsbId::new(0x18D1, 0x946B),
        }
    }

    /// Look up the mode for a VID/PID pair
    pub fn from_usb_id(id: UsbId) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.usb_id() == id)
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Sdp => write!(f, "SDP"),
            DeviceMode::Flashloader => write!(f, "flashloader"),
            DeviceMode::Oem => write!(f, "OEM"),
            DeviceMode::Bootloader => write!(f, "bootloader"),
        }
    }
}
