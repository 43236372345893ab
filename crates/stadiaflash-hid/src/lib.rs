//! stadiaflash-hid - USB HID transport for the controller reflasher
//!
//! Every controller personality (boot ROM SDP, flashloader, OEM firmware,
//! bootloader) enumerates as a USB HID device. This crate finds them with
//! `nusb` and exposes the HID interface as a
//! [`ReportChannel`](stadiaflash_core::ReportChannel).
//!
//! # Example
//!
//! ```no_run
//! use stadiaflash_hid::{find_controller, HidConfig, HidDevice};
//! use stadiaflash_core::sdp::Sdp;
//!
//! let controller = find_controller(None)?;
//! let mut device = HidDevice::open(&controller, &HidConfig::default())?;
//! let mut sdp = Sdp::new(&mut device)?;
//! let status = sdp.write_file(0x2000_0000, &[0u8; 16])?;
//! println!("SDP status 0x{:08x}", status);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;
mod oem;
mod protocol;

pub use device::{find_controller, list_controllers, ControllerInfo, HidConfig, HidDevice};
pub use error::{HidError, Result};
pub use oem::Oem;
