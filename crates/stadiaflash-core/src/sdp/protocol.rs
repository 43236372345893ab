//! SDP report ids, command opcodes and packet layouts

use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, Result};

// ===========================================================================
// Report IDs
// ===========================================================================

/// Host to device command
pub const REPORT_COMMAND: u8 = 0x01;
/// Host to device data stage
pub const REPORT_DATA: u8 = 0x02;
/// Device to host HAB mode notice
pub const REPORT_HAB_MODE: u8 = 0x03;
/// Device to host result
pub const REPORT_RESULT: u8 = 0x04;

/// Payload bytes per data stage report
pub const DATA_CHUNK_SIZE: usize = 1024;

/// Status returned after a successful WRITE_FILE
pub const STATUS_WRITE_FILE_COMPLETE: u32 = 0x8888_8888;

// ===========================================================================
// Commands
// ===========================================================================

/// SDP command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandType {
    /// Read a device register
    ReadRegister = 0x0101,
    /// Write a device register
    WriteRegister = 0x0202,
    /// Write a file to device memory
    WriteFile = 0x0404,
    /// Query the last error status
    ErrorStatus = 0x0505,
    /// Write a device configuration data table
    DcdWrite = 0x0A0A,
    /// Transfer execution to an address
    JumpAddress = 0x0B0B,
}

/// SDP command report as sent on the wire
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct CommandPacket {
    /// Always [`REPORT_COMMAND`]
    pub report_id: u8,
    /// [`CommandType`] opcode
    pub command_type: U16<BigEndian>,
    /// Target address
    pub address: U32<BigEndian>,
    /// Access format (register width); unused for file commands
    pub format: u8,
    /// Number of data units that follow
    pub data_count: U32<BigEndian>,
    /// Number of data bytes that follow
    pub byte_count: U32<BigEndian>,
    /// Reserved, zero
    pub reserved: u8,
}

impl CommandPacket {
    /// Build a command; `data_count` is used for both count fields
    pub fn new(command_type: CommandType, address: u32, format: u8, data_count: u32) -> Self {
        Self {
            report_id: REPORT_COMMAND,
            command_type: U16::new(command_type as u16),
            address: U32::new(address),
            format,
            data_count: U32::new(data_count),
            byte_count: U32::new(data_count),
            reserved: 0,
        }
    }
}

/// Split `data` into data stage reports, zero padding the last one
pub fn data_reports(data: &[u8]) -> impl Iterator<Item = Vec<u8>> + '_ {
    data.chunks(DATA_CHUNK_SIZE).map(|chunk| {
        let mut report = Vec::with_capacity(1 + DATA_CHUNK_SIZE);
        report.push(REPORT_DATA);
        report.extend_from_slice(chunk);
        report.resize(1 + DATA_CHUNK_SIZE, 0);
        report
    })
}

/// Decode the big-endian status word of a result report
pub fn parse_result(report: &[u8]) -> Result<u32> {
    match report.get(1..5) {
        Some(bytes) => Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(Error::MalformedResponse(format!(
            "SDP result report is {} bytes",
            report.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_layout() {
        let cmd = CommandPacket::new(CommandType::WriteFile, 0x2000_0000, 0, 0x1234);
        assert_eq!(
            cmd.as_bytes(),
            &[
                0x01, // report id
                0x04, 0x04, // type
                0x20, 0x00, 0x00, 0x00, // address
                0x00, // format
                0x00, 0x00, 0x12, 0x34, // data count
                0x00, 0x00, 0x12, 0x34, // byte count
                0x00, // reserved
            ]
        );
    }

    #[test]
    fn test_data_reports_reassemble() {
        for len in [0usize, 1, 1023, 1024, 1025, 4000] {
            let data: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let reports: Vec<_> = data_reports(&data).collect();
            assert_eq!(reports.len(), len.div_ceil(DATA_CHUNK_SIZE));

            let mut joined = Vec::new();
            for report in &reports {
                assert_eq!(report.len(), 1 + DATA_CHUNK_SIZE);
                assert_eq!(report[0], REPORT_DATA);
                joined.extend_from_slice(&report[1..]);
            }
            assert!(joined[len..].iter().all(|&b| b == 0));
            joined.truncate(len);
            assert_eq!(joined, data);
        }
    }

    #[test]
    fn test_parse_result() {
        assert_eq!(
            parse_result(&[REPORT_RESULT, 0x88, 0x88, 0x88, 0x88]).unwrap(),
            STATUS_WRITE_FILE_COMPLETE
        );
        assert!(matches!(
            parse_result(&[REPORT_RESULT, 0x00]),
            Err(Error::MalformedResponse(_))
        ));
    }
}
