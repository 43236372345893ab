//! FlexSPI register access through the flashloader
//!
//! The flashloader has no command for raw flash reads with an arbitrary LUT
//! sequence, so they are done by poking the FlexSPI controller registers
//! directly with 4-byte fills and reads.

use crate::error::Result;
use crate::flashloader::Flashloader;
use crate::report::ReportChannel;

/// FlexSPI register block base address
pub const FLEXSPI_BASE: u32 = 0x402A_8000;

/// FlexSPI register offsets
pub mod regs {
    /// Interrupt register
    pub const INTR: u32 = 0x14;
    /// Flash A1 control register 2
    pub const FLSHA1CR2: u32 = 0x80;
    /// IP control register 0 (flash address)
    pub const IPCR0: u32 = 0xA0;
    /// IP control register 1 (sequence id, data size)
    pub const IPCR1: u32 = 0xA4;
    /// IP command register
    pub const IPCMD: u32 = 0xB0;
    /// IP RX FIFO control
    pub const IPRXFCR: u32 = 0xB8;
    /// IP TX FIFO control
    pub const IPTXFCR: u32 = 0xBC;
    /// IP RX FIFO data register 0
    pub const RFDR0: u32 = 0x100;
}

/// FLSHA1CR2: clear instruction pointer
pub const FLSHCR2_CLRINSTRPTR: u32 = 1 << 31;
/// INTR: IP command done, grant timeout, RX watermark, TX watermark
pub const INTR_IP_FLAGS: u32 = 0x1E;
/// IPRXFCR / IPTXFCR: clear FIFO
pub const FIFO_CLEAR: u32 = 1;
/// IPCMD: trigger
pub const IPCMD_TRIGGER: u32 = 1;

/// Write a FlexSPI register
pub fn write_register<C: ReportChannel + ?Sized>(
    loader: &mut Flashloader<'_, C>,
    reg: u32,
    value: u32,
) -> Result<()> {
    loader.set32(FLEXSPI_BASE + reg, value)
}

/// Set bits in a FlexSPI register
///
/// The register is only written when the bits were not already set.
pub fn set_register_bits<C: ReportChannel + ?Sized>(
    loader: &mut Flashloader<'_, C>,
    reg: u32,
    bits: u32,
) -> Result<()> {
    let current = loader.read32(FLEXSPI_BASE + reg)?;
    let value = current | bits;
    if value == current {
        return Ok(());
    }
    loader.set32(FLEXSPI_BASE + reg, value)
}

/// Run LUT sequence 0 as an IP command at flash `offset` and return the
/// first RX FIFO word
///
/// What sequence 0 does depends on the configuration block last applied
/// with CONFIGURE_MEMORY: a plain read, or a device id read.
pub fn ip_read<C: ReportChannel + ?Sized>(
    loader: &mut Flashloader<'_, C>,
    offset: u32,
    size: u32,
) -> Result<u32> {
    set_register_bits(loader, regs::FLSHA1CR2, FLSHCR2_CLRINSTRPTR)?;
    set_register_bits(loader, regs::INTR, INTR_IP_FLAGS)?;
    write_register(loader, regs::IPCR0, offset)?;
    write_register(loader, regs::IPRXFCR, FIFO_CLEAR)?;
    write_register(loader, regs::IPTXFCR, FIFO_CLEAR)?;
    // ISEQID(0) | IDATSZ(size)
    write_register(loader, regs::IPCR1, size & 0xFFFF)?;
    write_register(loader, regs::IPCMD, IPCMD_TRIGGER)?;
    loader.read32(FLEXSPI_BASE + regs::RFDR0)
}
