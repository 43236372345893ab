//! USB HID and OEM control request constants

use std::time::Duration;

// ===========================================================================
// HID class
// ===========================================================================

/// HID interface class code
pub const HID_INTERFACE_CLASS: u8 = 0x03;

/// HID class request SET_REPORT
pub const HID_SET_REPORT: u8 = 0x09;

/// SET_REPORT wValue high byte for an output report
pub const HID_REPORT_TYPE_OUTPUT: u16 = 0x0200;

/// Timeout for outbound reports and control requests
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

// ===========================================================================
// OEM mode class requests
// ===========================================================================

/// Read firmware info, the build number is the first LE word
pub const OEM_GET_FIRMWARE_INFO: u8 = 0x81;

/// Ask the controller to sample the battery
pub const OEM_REFRESH_BATTERY: u8 = 0x83;

/// Read the last battery sample as an LE u16 percentage
pub const OEM_GET_BATTERY: u8 = 0x84;

/// Pause between battery refresh and read
pub const OEM_BATTERY_SETTLE: Duration = Duration::from_millis(100);

/// Buffer length for OEM IN requests
pub const OEM_RESPONSE_LEN: u16 = 64;
