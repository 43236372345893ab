//! SDP client

use std::time::Duration;

use zerocopy::IntoBytes;

use crate::error::{Error, Result};
use crate::mode::DeviceMode;
use crate::report::ReportChannel;

use super::protocol::*;

/// Per-report timeout while polling for a command result
pub const RESULT_TIMEOUT: Duration = Duration::from_millis(250);

/// Serial Download Protocol client
///
/// Borrows the report channel for as long as it is in use; it holds no
/// device state of its own.
pub struct Sdp<'a, C: ReportChannel + ?Sized> {
    channel: &'a mut C,
    result_timeout: Duration,
}

impl<'a, C: ReportChannel + ?Sized> Sdp<'a, C> {
    /// Attach to a device that must currently be in SDP mode
    pub fn new(channel: &'a mut C) -> Result<Self> {
        let found = channel.usb_id();
        if found != DeviceMode::Sdp.usb_id() {
            return Err(Error::DeviceIdentityMismatch {
                expected: DeviceMode::Sdp,
                found,
            });
        }

        Ok(Self {
            channel,
            result_timeout: RESULT_TIMEOUT,
        })
    }

    /// Override the per-report result timeout
    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    fn send_command(
        &mut self,
        command_type: CommandType,
        address: u32,
        format: u8,
        data_count: u32,
    ) -> Result<()> {
        let cmd = CommandPacket::new(command_type, address, format, data_count);
        log::debug!(
            "SDP command {:?}: address=0x{:08X}, count={}",
            command_type,
            address,
            data_count
        );
        self.channel.write_report(cmd.as_bytes())
    }

    /// Wait for a result report, skipping HAB mode notices
    fn read_result(&mut self) -> Result<u32> {
        loop {
            let Some(report) = self.channel.read_report(Some(self.result_timeout))? else {
                continue;
            };

            match report.first().copied() {
                Some(REPORT_HAB_MODE) => continue,
                Some(REPORT_RESULT) => return parse_result(&report),
                other => {
                    log::debug!("Ignoring SDP report with id {:02X?}", other);
                }
            }
        }
    }

    /// Write `data` to device memory at `address`
    ///
    /// Returns the status word reported by the boot ROM. A non-zero status is
    /// not treated as an error; [`STATUS_WRITE_FILE_COMPLETE`] means success.
    pub fn write_file(&mut self, address: u32, data: &[u8]) -> Result<u32> {
        self.write_file_with_progress(address, data, |_| {})
    }

    /// Like [`Sdp::write_file`], calling `progress` with the number of bytes
    /// sent after each data report
    pub fn write_file_with_progress<F>(
        &mut self,
        address: u32,
        data: &[u8],
        mut progress: F,
    ) -> Result<u32>
    where
        F: FnMut(usize),
    {
        self.send_command(CommandType::WriteFile, address, 0, data.len() as u32)?;

        let mut sent = 0usize;
        for report in data_reports(data) {
            self.channel.write_report(&report)?;
            sent = (sent + DATA_CHUNK_SIZE).min(data.len());
            progress(sent);
        }

        let status = self.read_result()?;
        log::debug!("SDP write_file status 0x{:08X}", status);
        Ok(status)
    }

    /// Query the boot ROM's last error status
    pub fn error_status(&mut self) -> Result<u32> {
        self.send_command(CommandType::ErrorStatus, 0, 0, 0)?;
        self.read_result()
    }

    /// Transfer execution to `address`
    ///
    /// No response is read: the boot ROM stops answering once it jumps.
    pub fn jump_address(&mut self, address: u32) -> Result<()> {
        self.send_command(CommandType::JumpAddress, address, 0, 0)
    }
}
