//! Controller metadata derived from the serial number and firmware build

use core::fmt;

/// First build number of the "bruce" firmware family
pub const BRUCE_FIRST_BUILD: u32 = 320_480;

/// Last DVT serial within the `98` prefix
const LAST_DVT_98XX: u32 = 0x9809;

/// Hardware revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareRevision {
    /// Design validation units
    Dvt,
    /// Production units
    Pvt,
}

impl fmt::Display for HardwareRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareRevision::Dvt => write!(f, "dvt"),
            HardwareRevision::Pvt => write!(f, "pvt"),
        }
    }
}

/// What the serial number says about a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialInfo {
    /// Hardware revision
    pub revision: HardwareRevision,
    /// Whether the controller can be reflashed at all
    pub flashable: bool,
}

impl SerialInfo {
    /// Classify a controller serial number
    pub fn classify(serial: &str) -> Self {
        let prefix = serial.get(0..2).unwrap_or("");
        let flashable = !matches!(prefix, "91" | "92" | "93" | "94");

        let dvt = match prefix {
            "95" | "96" | "97" => true,
            "98" => serial
                .get(0..4)
                .and_then(|s| u32::from_str_radix(s, 16).ok())
                .is_some_and(|n| n <= LAST_DVT_98XX),
            _ => false,
        };

        Self {
            revision: if dvt {
                HardwareRevision::Dvt
            } else {
                HardwareRevision::Pvt
            },
            flashable,
        }
    }
}

/// Firmware family for a build number
pub fn firmware_family(build: u32) -> &'static str {
    if build < BRUCE_FIRST_BUILD {
        "gotham"
    } else {
        "bruce"
    }
}
