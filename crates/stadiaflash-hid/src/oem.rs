//! Queries to a controller running its application firmware

use std::thread;

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{Interface, MaybeFuture};
use stadiaflash_core::{DeviceMode, Error as CoreError};

use crate::device::{claim_hid_interface, ControllerInfo};
use crate::error::{HidError, Result};
use crate::protocol::*;

/// A controller in OEM mode
pub struct Oem {
    interface: Interface,
    interface_number: u8,
}

impl Oem {
    /// Open a controller that must be in OEM mode
    pub fn open(controller: &ControllerInfo) -> Result<Self> {
        if controller.mode != DeviceMode::Oem {
            return Err(CoreError::DeviceIdentityMismatch {
                expected: DeviceMode::Oem,
                found: controller.usb_id(),
            }
            .into());
        }

        let device = controller.open_device()?;
        let (interface, endpoints) = claim_hid_interface(&device)?;
        Ok(Self {
            interface,
            interface_number: endpoints.interface_number,
        })
    }

    fn class_in(&self, request: u8) -> Result<Vec<u8>> {
        self.interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request,
                    value: 0,
                    index: self.interface_number as u16,
                    length: OEM_RESPONSE_LEN,
                },
                WRITE_TIMEOUT,
            )
            .wait()
            .map_err(|e| HidError::TransferFailed(format!("request 0x{:02X}: {}", request, e)))
    }

    fn class_out(&self, request: u8) -> Result<()> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request,
                    value: 0,
                    index: self.interface_number as u16,
                    data: &[],
                },
                WRITE_TIMEOUT,
            )
            .wait()
            .map_err(|e| HidError::TransferFailed(format!("request 0x{:02X}: {}", request, e)))
    }

    /// Firmware build number, `None` if the controller sent nothing usable
    pub fn firmware_version(&self) -> Result<Option<u32>> {
        let info = self.class_in(OEM_GET_FIRMWARE_INFO)?;
        Ok(parse_firmware_version(&info))
    }

    /// Battery level in percent, `None` if the controller sent nothing usable
    pub fn battery_percentage(&self) -> Result<Option<u16>> {
        self.class_out(OEM_REFRESH_BATTERY)?;
        thread::sleep(OEM_BATTERY_SETTLE);
        let level = self.class_in(OEM_GET_BATTERY)?;
        Ok(parse_battery(&level))
    }
}

fn parse_firmware_version(data: &[u8]) -> Option<u32> {
    let bytes = data.get(0..4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn parse_battery(data: &[u8]) -> Option<u16> {
    let bytes = data.get(0..2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firmware_version() {
        assert_eq!(
            parse_firmware_version(&[0xE0, 0xE3, 0x04, 0x00, 0xAA, 0xBB]),
            Some(320_480)
        );
        assert_eq!(parse_firmware_version(&[0x01, 0x02]), None);
        assert_eq!(parse_firmware_version(&[]), None);
    }

    #[test]
    fn test_battery() {
        assert_eq!(parse_battery(&[0x55, 0x00]), Some(85));
        assert_eq!(parse_battery(&[0x64]), None);
    }
}
