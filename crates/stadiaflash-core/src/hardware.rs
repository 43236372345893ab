//! Supported MCU and flash parts

use core::fmt;
use core::str::FromStr;

use crate::error::Error;

/// MCU silicon revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McuType {
    /// i.MX RT106x rev A0
    Imxrt106xA0,
    /// i.MX RT106x rev A1
    Imxrt106xA1,
}

impl McuType {
    /// Silicon id register value for this revision
    pub const fn silicon_id(self) -> u32 {
        match self {
            McuType::Imxrt106xA0 => 0x6C_0000,
            McuType::Imxrt106xA1 => 0x6C_0001,
        }
    }

    /// Look up a silicon id
    pub fn from_silicon_id(id: u32) -> Result<Self, Error> {
        match id {
            0x6C_0000 => Ok(McuType::Imxrt106xA0),
            0x6C_0001 => Ok(McuType::Imxrt106xA1),
            _ => Err(Error::UnknownMcu(id)),
        }
    }
}

impl fmt::Display for McuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McuType::Imxrt106xA0 => write!(f, "106XA0"),
            McuType::Imxrt106xA1 => write!(f, "106XA1"),
        }
    }
}

/// Serial NOR flash part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPart {
    /// GigaDevice 16 MiB
    Giga16m,
    /// Winbond W25Q128JW 16 MiB
    Winbond16m,
}

impl FlashPart {
    /// All supported parts
    pub const ALL: [FlashPart; 2] = [FlashPart::Giga16m, FlashPart::Winbond16m];

    /// Vendor id word read back with the vendor-id configuration block
    pub const fn vendor_id(self) -> u32 {
        match self {
            FlashPart::Giga16m => 0x17C8,
            FlashPart::Winbond16m => 0x17EF,
        }
    }

    /// Look up a vendor id word
    pub fn from_vendor_id(id: u32) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|part| part.vendor_id() == id)
            .ok_or(Error::UnknownFlash(id))
    }

    /// Part name
    pub const fn name(self) -> &'static str {
        match self {
            FlashPart::Giga16m => "Giga-16m",
            FlashPart::Winbond16m => "Winbond-16m",
        }
    }
}

impl FromStr for FlashPart {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|part| part.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownFlashName(s.to_string()))
    }
}

impl fmt::Display for FlashPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
