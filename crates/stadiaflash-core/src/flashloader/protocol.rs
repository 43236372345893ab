//! Flashloader report framing, command tags and packet layout
//!
//! Every HID report carries one frame:
//!
//! ```text
//! +-----------+------+-------------+-----------------+
//! | report id | 0x00 | length (LE) | payload         |
//! +-----------+------+-------------+-----------------+
//! ```
//!
//! Command and response payloads share one layout, little-endian:
//! `tag, flags, reserved, parameter_count, parameter_count x u32`.

use bitflags::bitflags;

use crate::error::{Error, Result};

// ===========================================================================
// Report IDs
// ===========================================================================

/// Host to device command frame
pub const REPORT_COMMAND_OUT: u8 = 0x01;
/// Host to device data frame
pub const REPORT_DATA_OUT: u8 = 0x02;
/// Device to host response frame
pub const REPORT_COMMAND_IN: u8 = 0x03;
/// Device to host data frame
pub const REPORT_DATA_IN: u8 = 0x04;

/// Frame header length (report id, padding, length)
pub const FRAME_HEADER_LEN: usize = 4;

/// Maximum payload of an outbound data frame
pub const MAX_DATA_CHUNK: usize = 512;

/// Largest region erased by a single FLASH_ERASE_REGION command
pub const ERASE_CHUNK_SIZE: u32 = 0x4000;

// ===========================================================================
// Command and response tags
// ===========================================================================

/// Flashloader command tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandTag {
    /// Erase the whole internal flash
    FlashEraseAll = 0x01,
    /// Erase a flash region
    FlashEraseRegion = 0x02,
    /// Read memory, data stage device to host
    ReadMemory = 0x03,
    /// Write memory, data stage host to device
    WriteMemory = 0x04,
    /// Fill memory with a 32-bit pattern
    FillMemory = 0x05,
    /// Disable flash security
    FlashSecurityDisable = 0x06,
    /// Read a property
    GetProperty = 0x07,
    /// Jump to an address
    Execute = 0x09,
    /// Call a function
    Call = 0x0A,
    /// Reset the device
    Reset = 0x0B,
    /// Write a property
    SetProperty = 0x0C,
    /// Erase all and unsecure
    FlashEraseAllUnsecure = 0x0D,
    /// Program an eFuse word
    EfuseProgram = 0x0E,
    /// Read an eFuse word
    EfuseRead = 0x0F,
    /// Read a flash resource
    FlashReadResource = 0x10,
    /// Configure an external memory from a RAM configuration block
    ConfigureMemory = 0x11,
    /// Reliable update
    ReliableUpdate = 0x12,
}

/// Flashloader response tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseTag {
    /// Status for any command: `[status, command tag]`
    Generic = 0xA0,
    /// ReadMemory start: `[status, byte count]`
    ReadMemory = 0xA3,
    /// GetProperty result
    GetProperty = 0xA7,
    /// FlashReadOnce result
    FlashReadOnce = 0xAF,
    /// FlashReadResource start
    FlashReadResource = 0xB0,
}

impl ResponseTag {
    /// Create a ResponseTag from a raw tag byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xA0 => Some(ResponseTag::Generic),
            0xA3 => Some(ResponseTag::ReadMemory),
            0xA7 => Some(ResponseTag::GetProperty),
            0xAF => Some(ResponseTag::FlashReadOnce),
            0xB0 => Some(ResponseTag::FlashReadResource),
            _ => None,
        }
    }
}

bitflags! {
    /// Packet flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketFlags: u8 {
        /// On a command: a data stage follows. On a response: more frames
        /// belong to the same logical response.
        const HAS_DATA_PHASE = 1 << 0;
    }
}

/// Memory ids accepted by CONFIGURE_MEMORY
pub mod memory_id {
    /// Serial NOR flash behind FlexSPI
    pub const FLEXSPI_NOR: u32 = 9;
}

// ===========================================================================
// Packets and frames
// ===========================================================================

/// A command or response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Command or response tag
    pub tag: u8,
    /// Packet flags
    pub flags: PacketFlags,
    /// Little-endian parameters
    pub parameters: Vec<u32>,
}

impl Packet {
    /// Build a command packet
    pub fn command(tag: CommandTag, flags: PacketFlags, parameters: &[u32]) -> Self {
        Self {
            tag: tag as u8,
            flags,
            parameters: parameters.to_vec(),
        }
    }

    /// Build a response packet
    pub fn response(tag: ResponseTag, flags: PacketFlags, parameters: &[u32]) -> Self {
        Self {
            tag: tag as u8,
            flags,
            parameters: parameters.to_vec(),
        }
    }

    /// Serialize to packet bytes (without frame header)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.parameters.len() * 4);
        buf.push(self.tag);
        buf.push(self.flags.bits());
        buf.push(0);
        buf.push(self.parameters.len() as u8);
        for param in &self.parameters {
            buf.extend_from_slice(&param.to_le_bytes());
        }
        buf
    }

    /// Parse packet bytes
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::MalformedResponse(format!(
                "packet is {} bytes, need at least 4",
                buf.len()
            )));
        }

        let count = buf[3] as usize;
        let body = &buf[4..];
        if body.len() < count * 4 {
            return Err(Error::MalformedResponse(format!(
                "packet declares {} parameters but carries {} bytes",
                count,
                body.len()
            )));
        }

        let parameters = body
            .chunks_exact(4)
            .take(count)
            .map(|p| u32::from_le_bytes([p[0], p[1], p[2], p[3]]))
            .collect();

        Ok(Self {
            tag: buf[0],
            flags: PacketFlags::from_bits_retain(buf[1]),
            parameters,
        })
    }

    /// Whether more frames belong to this response
    pub fn more_follows(&self) -> bool {
        self.flags.contains(PacketFlags::HAS_DATA_PHASE)
    }
}

/// Wrap a payload in a report frame
pub fn encode_frame(report_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut report = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    report.push(report_id);
    report.push(0);
    report.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    report.extend_from_slice(payload);
    report
}

/// Split a report into its id and payload
pub fn decode_frame(report: &[u8]) -> Result<(u8, &[u8])> {
    if report.len() < FRAME_HEADER_LEN {
        return Err(Error::MalformedResponse(format!(
            "frame is {} bytes",
            report.len()
        )));
    }

    let len = u16::from_le_bytes([report[2], report[3]]) as usize;
    let payload = report
        .get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len)
        .ok_or_else(|| {
            Error::MalformedResponse(format!(
                "frame declares {} bytes but carries {}",
                len,
                report.len() - FRAME_HEADER_LEN
            ))
        })?;

    Ok((report[0], payload))
}

/// Check a response packet's status
///
/// Generic and ReadMemory responses carry a status in parameter 0; any other
/// tag is accepted as is. Returns whether more frames follow.
pub fn check_response(packet: &Packet) -> Result<bool> {
    match ResponseTag::from_u8(packet.tag) {
        Some(ResponseTag::Generic) => {
            let Some(&status) = packet.parameters.first() else {
                return Err(Error::MalformedResponse(
                    "generic response without status".into(),
                ));
            };
            if status != 0 {
                // the failing command's tag is only needed to report it
                let Some(&tag) = packet.parameters.get(1) else {
                    return Err(Error::MalformedResponse(format!(
                        "generic response with status 0x{:X} but no command tag",
                        status
                    )));
                };
                return Err(Error::CommandFailed {
                    status,
                    tag: tag as u8,
                });
            }
        }
        Some(ResponseTag::ReadMemory) => {
            let Some(&status) = packet.parameters.first() else {
                return Err(Error::MalformedResponse(
                    "read memory response without status".into(),
                ));
            };
            if status != 0 {
                return Err(Error::CommandFailed {
                    status,
                    tag: CommandTag::ReadMemory as u8,
                });
            }
        }
        _ => {}
    }

    Ok(packet.more_follows())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        let packet = Packet::command(
            CommandTag::FlashEraseRegion,
            PacketFlags::empty(),
            &[0x6004_0000, 0x4000, 0],
        );
        assert_eq!(
            packet.to_bytes(),
            vec![
                0x02, 0x00, 0x00, 0x03, // header
                0x00, 0x00, 0x04, 0x60, // address
                0x00, 0x40, 0x00, 0x00, // length
                0x00, 0x00, 0x00, 0x00, // memory id
            ]
        );
    }

    #[test]
    fn test_frame_header() {
        let frame = encode_frame(REPORT_DATA_OUT, &[0xAA; 300]);
        assert_eq!(&frame[..4], &[0x02, 0x00, 0x2C, 0x01]);
        let (id, payload) = decode_frame(&frame).unwrap();
        assert_eq!(id, REPORT_DATA_OUT);
        assert_eq!(payload.len(), 300);
    }

    #[test]
    fn test_decode_frame_ignores_padding() {
        let mut report = encode_frame(REPORT_DATA_IN, &[1, 2, 3]);
        report.resize(64, 0);
        let (_, payload) = decode_frame(&report).unwrap();
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn test_decode_frame_truncated() {
        assert!(decode_frame(&[0x03, 0x00]).is_err());
        assert!(decode_frame(&[0x03, 0x00, 0x10, 0x00, 0xA0]).is_err());
    }

    #[test]
    fn test_packet_too_few_parameters() {
        assert!(matches!(
            Packet::from_bytes(&[0xA0, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00]),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_generic_success() {
        let packet = Packet::response(ResponseTag::Generic, PacketFlags::empty(), &[0, 0x02]);
        assert_eq!(check_response(&packet), Ok(false));
    }

    #[test]
    fn test_generic_status_only() {
        let ok = Packet::response(ResponseTag::Generic, PacketFlags::empty(), &[0]);
        assert_eq!(check_response(&ok), Ok(false));

        let failed = Packet::response(ResponseTag::Generic, PacketFlags::empty(), &[0x2711]);
        assert!(matches!(
            check_response(&failed),
            Err(Error::MalformedResponse(_))
        ));

        let empty = Packet::response(ResponseTag::Generic, PacketFlags::empty(), &[]);
        assert!(matches!(
            check_response(&empty),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_generic_failure_carries_status_and_tag() {
        for status in [1u32, 0x2712, 0xFFFF_FFFF] {
            let packet =
                Packet::response(ResponseTag::Generic, PacketFlags::empty(), &[status, 0x11]);
            assert_eq!(
                check_response(&packet),
                Err(Error::CommandFailed { status, tag: 0x11 })
            );
        }
    }

    #[test]
    fn test_read_memory_failure() {
        let packet = Packet::response(ResponseTag::ReadMemory, PacketFlags::empty(), &[0x2711, 0]);
        assert_eq!(
            check_response(&packet),
            Err(Error::CommandFailed {
                status: 0x2711,
                tag: CommandTag::ReadMemory as u8
            })
        );
    }

    #[test]
    fn test_other_tags_not_checked() {
        let packet = Packet::response(
            ResponseTag::GetProperty,
            PacketFlags::HAS_DATA_PHASE,
            &[0xDEAD, 1],
        );
        assert_eq!(check_response(&packet), Ok(true));
    }
}
