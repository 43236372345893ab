//! Hardware identification and the erase/program/reset choreography
//!
//! Order matters when programming:
//!
//! 1. clear GPR4..GPR6 before touching flash
//! 2. erase and write the IVT (bootable images only)
//! 3. erase the whole destination range, then write the image
//! 4. select the application slot in GPR6
//! 5. reset
//!
//! A failure in the middle leaves the flash in an unspecified state. Nothing
//! here tries to recover from that.

use crate::error::{Error, Result};
use crate::firmware::FirmwareImage;
use crate::flashloader::{memory_id, Flashloader};
use crate::flexspi;
use crate::hardware::{FlashPart, McuType};
use crate::report::ReportChannel;

/// Silicon id register (OCOTP/ANADIG)
pub const SILICON_ID_ADDRESS: u32 = 0x400D_8260;
/// RAM address configuration blocks are staged at
pub const CONFIG_BLOCK_ADDRESS: u32 = 0x2000;
/// Configuration option word that sets up the GigaDevice part
pub const GIGA_CONFIG_OPTION: u32 = 0xC000_0206;

/// General purpose registers used by the bootloader to pick a slot
pub const GPR4: u32 = 0x400F_8030;
/// See [`GPR4`]
pub const GPR5: u32 = 0x400F_8034;
/// Slot select
pub const GPR6: u32 = 0x400F_8038;

/// Flash address the IVT of a bootable image lives at
pub const IVT_FLASH_ADDRESS: u32 = 0x6000_1000;

/// IP read size used for the vendor id
const VENDOR_ID_READ_SIZE: u32 = 2;
/// IP read size used when dumping
const DUMP_READ_SIZE: u32 = 4;

/// Pre-built FlexSPI configuration blocks, staged verbatim
#[derive(Debug, Clone, Default)]
pub struct ConfigBlocks {
    /// Block whose sequence 0 reads the flash vendor id
    pub get_vendor_id: Vec<u8>,
    /// Block for the Winbond W25Q128JW
    pub w25q128jw: Vec<u8>,
}

/// How often a failed word read is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry until the read succeeds
    Unbounded,
    /// Retry at most this many times after the first attempt
    Bounded(u32),
}

impl RetryPolicy {
    fn allows(&self, retries_done: u32) -> bool {
        match self {
            RetryPolicy::Unbounded => true,
            RetryPolicy::Bounded(max) => retries_done < *max,
        }
    }
}

/// Drives a flashloader session through identification and programming
pub struct Orchestrator<'a, C: ReportChannel + ?Sized> {
    loader: Flashloader<'a, C>,
}

impl<'a, C: ReportChannel + ?Sized> Orchestrator<'a, C> {
    /// Wrap a flashloader client
    pub fn new(loader: Flashloader<'a, C>) -> Self {
        Self { loader }
    }

    /// Access the underlying client
    pub fn loader(&mut self) -> &mut Flashloader<'a, C> {
        &mut self.loader
    }

    /// Identify the MCU from its silicon id register
    pub fn detect_mcu(&mut self) -> Result<McuType> {
        let id = self.loader.read32(SILICON_ID_ADDRESS)?;
        let mcu = McuType::from_silicon_id(id)?;
        log::info!("MCU: {:X} ({})", id, mcu);
        Ok(mcu)
    }

    /// Identify the flash part by reading its vendor id through FlexSPI
    pub fn detect_flash(&mut self, blocks: &ConfigBlocks) -> Result<FlashPart> {
        self.loader
            .write_memory(CONFIG_BLOCK_ADDRESS, &blocks.get_vendor_id)?;
        self.loader
            .configure_memory(memory_id::FLEXSPI_NOR, CONFIG_BLOCK_ADDRESS)?;

        let id = flexspi::ip_read(&mut self.loader, 0, VENDOR_ID_READ_SIZE)?;
        let part = FlashPart::from_vendor_id(id)?;
        log::info!("Flash: {:X} ({})", id, part);
        Ok(part)
    }

    /// Configure FlexSPI for normal access to `part`
    pub fn setup_flash(&mut self, part: FlashPart, blocks: &ConfigBlocks) -> Result<()> {
        log::info!("Setting up flash {}", part);
        match part {
            FlashPart::Giga16m => self.loader.set32(CONFIG_BLOCK_ADDRESS, GIGA_CONFIG_OPTION)?,
            FlashPart::Winbond16m => self
                .loader
                .write_memory(CONFIG_BLOCK_ADDRESS, &blocks.w25q128jw)?,
        }
        self.loader
            .configure_memory(memory_id::FLEXSPI_NOR, CONFIG_BLOCK_ADDRESS)
    }

    /// Identify the hardware and bring up the flash
    ///
    /// `part` skips flash detection when given.
    pub fn prepare(
        &mut self,
        blocks: &ConfigBlocks,
        part: Option<FlashPart>,
    ) -> Result<(McuType, FlashPart)> {
        let mcu = self.detect_mcu()?;
        let part = match part {
            Some(part) => {
                log::info!("Using flash part {} without detection", part);
                part
            }
            None => self.detect_flash(blocks)?,
        };
        self.setup_flash(part, blocks)?;
        Ok((mcu, part))
    }

    /// Erase and program a firmware image into its partition, then reset
    pub fn program(&mut self, image: &FirmwareImage) -> Result<()> {
        let partition = image.info().partition;
        let data = image.data();

        log::info!("Clearing GPR flags");
        for gpr in [GPR4, GPR5, GPR6] {
            self.loader.set32(gpr, 0)?;
        }

        if let Some(ivt) = image.ivt() {
            log::info!("Flashing IVT to 0x{:08X}", IVT_FLASH_ADDRESS);
            self.loader
                .flash_erase_region(IVT_FLASH_ADDRESS, ivt.len() as u32)?;
            self.loader.write_memory(IVT_FLASH_ADDRESS, ivt)?;
        }

        if data.len() as u64 > partition.size as u64 {
            log::warn!(
                "Image is 0x{:X} bytes, larger than {} (0x{:X} bytes)",
                data.len(),
                partition.name,
                partition.size
            );
        }

        log::info!(
            "Flashing to {} at 0x{:08X}",
            partition.name,
            partition.base_address
        );
        self.loader
            .flash_erase_region(partition.base_address, data.len() as u32)?;
        self.loader.write_memory(partition.base_address, data)?;

        if partition.is_application() {
            log::info!("Selecting slot {}", partition.slot);
            self.loader.set32(GPR6, partition.slot)?;
        }

        log::info!("Resetting device");
        self.loader.reset()
    }

    /// Read one flash word through FlexSPI, retrying failures per `policy`
    ///
    /// Frames still in flight from the failed attempt are discarded before
    /// each retry. A stopped receiver is never retried since no read can
    /// succeed afterwards.
    pub fn read_word_with_retry(&mut self, offset: u32, policy: RetryPolicy) -> Result<u32> {
        let mut retries = 0u32;
        loop {
            match flexspi::ip_read(&mut self.loader, offset, DUMP_READ_SIZE) {
                Ok(word) => return Ok(word),
                Err(e @ Error::ReceiverStopped(_)) => return Err(e),
                Err(e) if policy.allows(retries) => {
                    log::warn!(
                        "Failed to read from 0x{:08X} ({}), trying again...",
                        offset,
                        e
                    );
                    let stale = self.loader.discard_pending()?;
                    if stale > 0 {
                        log::debug!("Dropped {} stale frames before retrying", stale);
                    }
                    retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Dump flash words in `[start, end)`, both rounded down to 4 bytes
    ///
    /// Each word is handed to `sink` together with its offset as soon as it
    /// has been read, so whatever the sink stored survives a later failure.
    pub fn dump<E, F>(
        &mut self,
        start: u32,
        end: u32,
        policy: RetryPolicy,
        mut sink: F,
    ) -> core::result::Result<(), E>
    where
        E: From<Error>,
        F: FnMut(u32, u32) -> core::result::Result<(), E>,
    {
        for index in start / 4..end / 4 {
            let offset = index * 4;
            let word = self.read_word_with_retry(offset, policy)?;
            sink(offset, word)?;
        }

        Ok(())
    }
}
