//! Firmware image parsing
//!
//! A signed firmware image optionally starts with a 4 KiB IVT region (only
//! images that the boot ROM starts directly have one). After that comes the
//! application vector table, whose second word is the reset handler, and at
//! 0x400 a 256-byte build info record:
//!
//! ```text
//! 0x00  header  0x747315A2
//! 0x04  (unused)
//! 0x08  size    0x100
//! 0xFC  footer  0x4786CD88
//! ```
//!
//! The flash partition to program is derived from the reset handler address.

use core::fmt;

use crate::error::{Error, ImageError, Result};

/// Big-endian first word of an image that carries an IVT
pub const IVT_MARKER: u32 = 0xD100_2041;
/// Size of the IVT region
pub const IVT_SIZE: usize = 0x1000;
/// Offset of the build info record (after the IVT, if any)
pub const BUILD_INFO_OFFSET: usize = 0x400;
/// Length of the build info record
pub const BUILD_INFO_SIZE: usize = 0x100;
/// Offset of the reset handler in the vector table
pub const RESET_HANDLER_OFFSET: usize = 4;

/// Build info header magic
pub const BUILD_INFO_HEADER: u32 = 0x7473_15A2;
/// Build info footer magic
pub const BUILD_INFO_FOOTER: u32 = 0x4786_CD88;

/// A flash partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// Human readable name
    pub name: &'static str,
    /// Base address in the FlexSPI memory map
    pub base_address: u32,
    /// Partition size in bytes
    pub size: u32,
    /// Slot id
    pub slot: u32,
}

/// Known partitions with the inclusive reset handler range that selects them
///
/// Ranges are tried in order; the first match wins.
const PARTITIONS: [(u32, u32, Partition); 4] = [
    (
        0x6004_0000,
        0x6080_0000,
        Partition {
            name: "Application A",
            base_address: 0x6004_0000,
            size: 0x7C_0000,
            slot: 1,
        },
    ),
    (
        0x6084_0000,
        0x6100_0000,
        Partition {
            name: "Application B",
            base_address: 0x6084_0000,
            size: 0x7C_0000,
            slot: 2,
        },
    ),
    (
        0x6080_0000,
        0x6080_2000,
        Partition {
            name: "Bootloader A",
            base_address: 0x6080_0000,
            size: 0x2_0000,
            slot: 3,
        },
    ),
    (
        0x6082_0000,
        0x6082_2000,
        Partition {
            name: "Bootloader B",
            base_address: 0x6082_0000,
            size: 0x2_0000,
            slot: 4,
        },
    ),
];

impl Partition {
    /// Select the partition whose range contains `reset_handler`
    pub fn for_reset_handler(reset_handler: u32) -> Result<Partition> {
        PARTITIONS
            .iter()
            .find(|(start, end, _)| (*start..=*end).contains(&reset_handler))
            .map(|(_, _, partition)| *partition)
            .ok_or(Error::NoMatchingPartition(reset_handler))
    }

    /// Whether this is an application slot (selected through GPR6)
    pub fn is_application(&self) -> bool {
        matches!(self.slot, 1 | 2)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at 0x{:08X} (0x{:X} bytes, slot {})",
            self.name, self.base_address, self.size, self.slot
        )
    }
}

/// Parsed build info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    /// Whether the image carries an IVT
    pub bootable: bool,
    /// Offset of the build info record in the image
    pub offset: usize,
    /// Reset handler from the vector table
    pub reset_handler: u32,
    /// Partition selected by the reset handler
    pub partition: Partition,
}

fn read_le32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(Error::InvalidImage(ImageError::Truncated {
            needed: offset + 4,
            len: data.len(),
        }))
}

impl BuildInfo {
    /// Parse the build info of a firmware image
    pub fn parse(data: &[u8]) -> Result<Self> {
        let bootable = data
            .get(0..4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]) == IVT_MARKER)
            .unwrap_or(false);
        let shift = if bootable { IVT_SIZE } else { 0 };

        let offset = BUILD_INFO_OFFSET + shift;
        if data.len() < offset + BUILD_INFO_SIZE {
            return Err(ImageError::Truncated {
                needed: offset + BUILD_INFO_SIZE,
                len: data.len(),
            }
            .into());
        }

        let header = read_le32(data, offset)?;
        if header != BUILD_INFO_HEADER {
            return Err(ImageError::BadHeader(header).into());
        }
        let size = read_le32(data, offset + 8)?;
        if size != BUILD_INFO_SIZE as u32 {
            return Err(ImageError::BadSize(size).into());
        }
        let footer = read_le32(data, offset + BUILD_INFO_SIZE - 4)?;
        if footer != BUILD_INFO_FOOTER {
            return Err(ImageError::BadFooter(footer).into());
        }

        let reset_handler = read_le32(data, RESET_HANDLER_OFFSET + shift)?;
        let partition = Partition::for_reset_handler(reset_handler)?;

        Ok(Self {
            bootable,
            offset,
            reset_handler,
            partition,
        })
    }
}

/// A firmware image together with its build info
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
    info: BuildInfo,
}

impl FirmwareImage {
    /// Parse a firmware image
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let info = BuildInfo::parse(&data)?;
        Ok(Self { data, info })
    }

    /// Raw image bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Parsed build info
    pub fn info(&self) -> &BuildInfo {
        &self.info
    }

    /// The IVT region, for bootable images
    pub fn ivt(&self) -> Option<&[u8]> {
        self.info.bootable.then(|| &self.data[..IVT_SIZE])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an image with a valid build info record
    pub(crate) fn make_image(len: usize, bootable: bool, reset_handler: u32) -> Vec<u8> {
        let mut data = vec![0xFFu8; len];
        let shift = if bootable { IVT_SIZE } else { 0 };
        if bootable {
            data[0..4].copy_from_slice(&IVT_MARKER.to_be_bytes());
        }
        data[shift + 4..shift + 8].copy_from_slice(&reset_handler.to_le_bytes());

        let off = BUILD_INFO_OFFSET + shift;
        data[off..off + 4].copy_from_slice(&BUILD_INFO_HEADER.to_le_bytes());
        data[off + 8..off + 12].copy_from_slice(&(BUILD_INFO_SIZE as u32).to_le_bytes());
        data[off + 0xFC..off + 0x100].copy_from_slice(&BUILD_INFO_FOOTER.to_le_bytes());
        data
    }

    #[test]
    fn test_non_bootable() {
        let info = BuildInfo::parse(&make_image(0x2000, false, 0x6005_0000)).unwrap();
        assert!(!info.bootable);
        assert_eq!(info.offset, 0x400);
        assert_eq!(info.reset_handler, 0x6005_0000);
        assert_eq!(info.partition.name, "Application A");
    }

    #[test]
    fn test_bootable() {
        let image = FirmwareImage::new(make_image(0x3000, true, 0x6080_1000)).unwrap();
        assert!(image.info().bootable);
        assert_eq!(image.info().offset, 0x1400);
        assert_eq!(image.info().partition.name, "Bootloader A");
        assert_eq!(image.ivt().map(|ivt| ivt.len()), Some(IVT_SIZE));
    }

    #[test]
    fn test_corrupted_fields() {
        for bootable in [false, true] {
            let off = BUILD_INFO_OFFSET + if bootable { IVT_SIZE } else { 0 };
            for (field, expected) in [
                (off, ImageError::BadHeader(0x7473_15A3)),
                (off + 8, ImageError::BadSize(0x101)),
                (off + 0xFC, ImageError::BadFooter(0x4786_CD89)),
            ] {
                let mut data = make_image(0x2000, bootable, 0x6005_0000);
                data[field] ^= 0x01;
                assert_eq!(
                    BuildInfo::parse(&data),
                    Err(Error::InvalidImage(expected))
                );
            }
        }
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            BuildInfo::parse(&[0u8; 0x420]),
            Err(Error::InvalidImage(ImageError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_partition_ranges() {
        let cases = [
            (0x6004_0000, Some(1)),
            (0x6080_0000, Some(1)),
            (0x6084_0000, Some(2)),
            (0x6100_0000, Some(2)),
            (0x6080_0001, Some(3)),
            (0x6080_2000, Some(3)),
            (0x6082_0000, Some(4)),
            (0x6082_2000, Some(4)),
            (0x6003_FFFF, None),
            (0x6080_2001, None),
            (0x6082_2001, None),
            (0x6100_0001, None),
            (0x0000_0000, None),
        ];
        for (address, slot) in cases {
            match Partition::for_reset_handler(address) {
                Ok(partition) => assert_eq!(Some(partition.slot), slot, "0x{:08X}", address),
                Err(e) => {
                    assert_eq!(slot, None, "0x{:08X}", address);
                    assert_eq!(e, Error::NoMatchingPartition(address));
                }
            }
        }
    }

    #[test]
    fn test_unmatched_reset_handler() {
        assert_eq!(
            BuildInfo::parse(&make_image(0x2000, false, 0x2000_0000)),
            Err(Error::NoMatchingPartition(0x2000_0000))
        );
    }
}
