//! Flashloader client

use std::time::Duration;

use crate::error::{Error, Result};
use crate::mode::DeviceMode;
use crate::report::ReportChannel;

use super::protocol::*;

/// Per-frame timeout while waiting for a response
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Flashloader protocol client
///
/// Calls are strictly sequential. Any non-zero status aborts the call with
/// [`Error::CommandFailed`]; nothing is retried here.
pub struct Flashloader<'a, C: ReportChannel + ?Sized> {
    channel: &'a mut C,
    frame_timeout: Duration,
}

impl<'a, C: ReportChannel + ?Sized> Flashloader<'a, C> {
    /// Attach to a device that must currently be running the flashloader
    pub fn new(channel: &'a mut C) -> Result<Self> {
        let found = channel.usb_id();
        if found != DeviceMode::Flashloader.usb_id() {
            return Err(Error::DeviceIdentityMismatch {
                expected: DeviceMode::Flashloader,
                found,
            });
        }

        Ok(Self {
            channel,
            frame_timeout: FRAME_TIMEOUT,
        })
    }

    /// Override the per-frame response timeout
    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    fn send_frame(&mut self, report_id: u8, payload: &[u8]) -> Result<()> {
        self.channel.write_report(&encode_frame(report_id, payload))
    }

    fn receive_frame(&mut self) -> Result<Option<(u8, Vec<u8>)>> {
        let Some(report) = self.channel.read_report(Some(self.frame_timeout))? else {
            return Ok(None);
        };
        let (id, payload) = decode_frame(&report)?;
        Ok(Some((id, payload.to_vec())))
    }

    /// Send a command frame
    pub fn send_command(
        &mut self,
        tag: CommandTag,
        flags: PacketFlags,
        parameters: &[u32],
    ) -> Result<()> {
        log::debug!("Flashloader command {:?} {:X?}", tag, parameters);
        let packet = Packet::command(tag, flags, parameters);
        self.send_frame(REPORT_COMMAND_OUT, &packet.to_bytes())
    }

    /// Drain one logical response
    ///
    /// Keeps reading while response frames have the more-follows flag set.
    /// Data frames seen on the way are concatenated and returned.
    pub fn receive_response(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();

        loop {
            let Some((id, payload)) = self.receive_frame()? else {
                continue;
            };

            match id {
                REPORT_COMMAND_IN => {
                    let packet = Packet::from_bytes(&payload)?;
                    log::trace!(
                        "Flashloader response tag=0x{:02X} flags={:?} {:X?}",
                        packet.tag,
                        packet.flags,
                        packet.parameters
                    );
                    if !check_response(&packet)? {
                        return Ok(data);
                    }
                }
                REPORT_DATA_IN => data.extend_from_slice(&payload),
                other => log::debug!("Ignoring frame with report id 0x{:02X}", other),
            }
        }
    }

    /// Throw away frames left over from an abandoned call
    ///
    /// Waits up to one frame timeout for stragglers, so a response that
    /// arrives late cannot be taken for the answer to the next command.
    /// Returns the number of frames discarded.
    pub fn discard_pending(&mut self) -> Result<usize> {
        let mut discarded = 0;
        loop {
            match self.channel.read_report(Some(self.frame_timeout)) {
                Ok(Some(report)) => {
                    log::debug!(
                        "Discarding stale frame with report id 0x{:02X}",
                        report.first().copied().unwrap_or(0)
                    );
                    discarded += 1;
                }
                Ok(None) | Err(Error::Timeout) => return Ok(discarded),
                Err(e) => return Err(e),
            }
        }
    }

    /// Erase `size` bytes of flash starting at `address`
    ///
    /// Issued as independent commands of at most 16 KiB each.
    pub fn flash_erase_region(&mut self, address: u32, size: u32) -> Result<()> {
        let mut address = address;
        let mut remaining = size;

        while remaining > 0 {
            let len = remaining.min(ERASE_CHUNK_SIZE);
            self.send_command(
                CommandTag::FlashEraseRegion,
                PacketFlags::empty(),
                &[address, len, 0],
            )?;
            self.receive_response()?;

            address = address.wrapping_add(len);
            remaining -= len;
        }

        Ok(())
    }

    /// Read `size` bytes of memory
    pub fn read_memory(&mut self, address: u32, size: usize) -> Result<Vec<u8>> {
        self.send_command(
            CommandTag::ReadMemory,
            PacketFlags::empty(),
            &[address, size as u32, 0],
        )?;
        let mut data = self.receive_response()?;

        if data.len() < size {
            return Err(Error::ShortRead {
                address,
                expected: size,
                actual: data.len(),
            });
        }
        data.truncate(size);
        Ok(data)
    }

    /// Write `data` to memory, flash included
    pub fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.send_command(
            CommandTag::WriteMemory,
            PacketFlags::HAS_DATA_PHASE,
            &[address, data.len() as u32, 0],
        )?;
        self.receive_response()?;

        for chunk in data.chunks(MAX_DATA_CHUNK) {
            self.send_frame(REPORT_DATA_OUT, chunk)?;
        }

        self.receive_response()?;
        Ok(())
    }

    /// Fill `size` bytes at `address` with a repeating 32-bit `pattern`
    pub fn fill_memory(&mut self, address: u32, size: u32, pattern: u32) -> Result<()> {
        self.send_command(
            CommandTag::FillMemory,
            PacketFlags::empty(),
            &[address, size, pattern],
        )?;
        self.receive_response()?;
        Ok(())
    }

    /// Configure an external memory from the block staged at `address`
    pub fn configure_memory(&mut self, memory_id: u32, address: u32) -> Result<()> {
        self.send_command(
            CommandTag::ConfigureMemory,
            PacketFlags::empty(),
            &[memory_id, address],
        )?;
        self.receive_response()?;
        Ok(())
    }

    /// Reset the device
    ///
    /// The device may go away before answering; a missing answer is not an
    /// error.
    pub fn reset(&mut self) -> Result<()> {
        self.send_command(CommandTag::Reset, PacketFlags::empty(), &[])?;
        match self.receive_response() {
            Ok(_) => Ok(()),
            Err(e @ (Error::Timeout | Error::ReceiverStopped(_))) => {
                log::debug!("No reset response: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Read one 32-bit word
    pub fn read32(&mut self, address: u32) -> Result<u32> {
        let data = self.read_memory(address, 4)?;
        Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Write one 32-bit word
    ///
    /// Uses a 4-byte fill so no data stage is needed.
    pub fn set32(&mut self, address: u32, value: u32) -> Result<()> {
        self.fill_memory(address, 4, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::UsbId;
    use crate::testing::{ScriptedChannel, SimulatedFlashloader};

    fn response_frame(tag: ResponseTag, flags: PacketFlags, params: &[u32]) -> Vec<u8> {
        encode_frame(
            REPORT_COMMAND_IN,
            &Packet::response(tag, flags, params).to_bytes(),
        )
    }

    fn loader_channel() -> ScriptedChannel {
        ScriptedChannel::new(DeviceMode::Flashloader.usb_id())
    }

    #[test]
    fn test_wrong_mode_rejected() {
        let mut channel = ScriptedChannel::new(UsbId::new(0x1FC9, 0x0135));
        assert!(matches!(
            Flashloader::new(&mut channel).err(),
            Some(Error::DeviceIdentityMismatch {
                expected: DeviceMode::Flashloader,
                ..
            })
        ));
    }

    #[test]
    fn test_multi_frame_response_accumulates_data() {
        let mut channel = loader_channel();
        channel.queue(response_frame(
            ResponseTag::ReadMemory,
            PacketFlags::HAS_DATA_PHASE,
            &[0, 6],
        ));
        channel.queue(encode_frame(REPORT_DATA_IN, &[1, 2, 3]));
        channel.queue(response_frame(
            ResponseTag::GetProperty,
            PacketFlags::HAS_DATA_PHASE,
            &[],
        ));
        channel.queue(encode_frame(REPORT_DATA_IN, &[4, 5, 6]));
        channel.queue(response_frame(
            ResponseTag::Generic,
            PacketFlags::empty(),
            &[0, CommandTag::ReadMemory as u32],
        ));
        channel.queue(response_frame(ResponseTag::Generic, PacketFlags::empty(), &[0, 0]));

        let mut loader = Flashloader::new(&mut channel).unwrap();
        assert_eq!(loader.receive_response().unwrap(), vec![1, 2, 3, 4, 5, 6]);
        // the trailing response belongs to the next call
        assert_eq!(channel.inbound.len(), 1);
    }

    #[test]
    fn test_generic_failure_raises() {
        let mut channel = loader_channel();
        channel.queue(response_frame(
            ResponseTag::Generic,
            PacketFlags::empty(),
            &[0x2712, CommandTag::ConfigureMemory as u32],
        ));
        let err = Flashloader::new(&mut channel)
            .unwrap()
            .configure_memory(memory_id::FLEXSPI_NOR, 0x2000)
            .unwrap_err();
        assert_eq!(
            err,
            Error::CommandFailed {
                status: 0x2712,
                tag: CommandTag::ConfigureMemory as u8
            }
        );
    }

    #[test]
    fn test_timeout_propagates() {
        let mut channel = loader_channel();
        let err = Flashloader::new(&mut channel)
            .unwrap()
            .fill_memory(0x2000, 4, 0)
            .unwrap_err();
        assert_eq!(err, Error::Timeout);
    }

    #[test]
    fn test_discard_pending_drains_queue() {
        let mut channel = loader_channel();
        channel.queue(response_frame(ResponseTag::Generic, PacketFlags::empty(), &[0, 5]));
        channel.queue(encode_frame(REPORT_DATA_IN, &[1, 2, 3, 4]));

        let mut loader = Flashloader::new(&mut channel).unwrap();
        assert_eq!(loader.discard_pending().unwrap(), 2);
        assert_eq!(loader.discard_pending().unwrap(), 0);
        assert!(channel.inbound.is_empty());
    }

    #[test]
    fn test_reset_without_response() {
        let mut channel = loader_channel();
        Flashloader::new(&mut channel).unwrap().reset().unwrap();
        let packet = Packet::from_bytes(&channel.written[0][4..]).unwrap();
        assert_eq!(packet.tag, CommandTag::Reset as u8);
        assert!(packet.parameters.is_empty());
    }

    #[test]
    fn test_erase_chunking() {
        for size in [0u32, 1, 0x3FFF, 0x4000, 0x4001, 0x10000, 0x2_2345] {
            let mut device = SimulatedFlashloader::new();
            Flashloader::new(&mut device)
                .unwrap()
                .flash_erase_region(0x6004_0000, size)
                .unwrap();

            let erases = device.erases();
            assert_eq!(erases.len() as u32, size.div_ceil(ERASE_CHUNK_SIZE));

            let mut next = 0x6004_0000;
            for &(address, len) in &erases {
                assert_eq!(address, next);
                assert!(len > 0 && len <= ERASE_CHUNK_SIZE);
                next = address + len;
            }
            assert_eq!(next, 0x6004_0000 + size);
        }
    }

    #[test]
    fn test_write_memory_data_stage() {
        for len in [1usize, 511, 512, 513, 2000] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut device = SimulatedFlashloader::new();
            Flashloader::new(&mut device)
                .unwrap()
                .write_memory(0x2000, &data)
                .unwrap();

            assert_eq!(device.data_frame_sizes().len(), len.div_ceil(MAX_DATA_CHUNK));
            assert!(device.data_frame_sizes().iter().all(|&n| n <= MAX_DATA_CHUNK));
            assert_eq!(device.written_at(0x2000), Some(&data[..]));
        }
    }

    #[test]
    fn test_read32_set32() {
        let mut device = SimulatedFlashloader::new();
        let mut loader = Flashloader::new(&mut device).unwrap();
        loader.set32(0x400F_8038, 2).unwrap();
        assert_eq!(loader.read32(0x400F_8038).unwrap(), 2);
        assert_eq!(device.word(0x400F_8038), 2);
    }

    #[test]
    fn test_read_memory_failure() {
        let mut device = SimulatedFlashloader::new();
        device.fail_next_reads(1);
        let mut loader = Flashloader::new(&mut device).unwrap();
        assert!(matches!(
            loader.read32(0x1000),
            Err(Error::CommandFailed { tag: 0x03, .. })
        ));
        assert_eq!(loader.read32(0x1000).unwrap(), 0);
    }

    #[test]
    fn test_read_memory_short() {
        let mut channel = loader_channel();
        channel.queue(response_frame(
            ResponseTag::ReadMemory,
            PacketFlags::HAS_DATA_PHASE,
            &[0, 4],
        ));
        channel.queue(encode_frame(REPORT_DATA_IN, &[1, 2]));
        channel.queue(response_frame(
            ResponseTag::Generic,
            PacketFlags::empty(),
            &[0, CommandTag::ReadMemory as u32],
        ));
        let err = Flashloader::new(&mut channel)
            .unwrap()
            .read_memory(0x1000, 4)
            .unwrap_err();
        assert_eq!(
            err,
            Error::ShortRead {
                address: 0x1000,
                expected: 4,
                actual: 2
            }
        );
    }
}
