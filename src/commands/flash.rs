//! Firmware programming command implementation

use stadiaflash_core::firmware::FirmwareImage;
use stadiaflash_core::hardware::FlashPart;
use stadiaflash_core::orchestrator::{ConfigBlocks, Orchestrator};
use std::path::Path;

use super::Options;
use crate::data::{load_config_blocks, read_file};

/// Configuration blocks needed to bring up `part`, or to detect it
pub(super) fn config_blocks_for(
    opts: &Options,
    part: Option<FlashPart>,
) -> Result<ConfigBlocks, Box<dyn std::error::Error>> {
    match part {
        // the GigaDevice part is set up from an option word alone
        Some(FlashPart::Giga16m) => Ok(ConfigBlocks::default()),
        _ => load_config_blocks(opts.data_dir.as_deref()),
    }
}

/// Program a signed firmware image and reset into it
pub fn run_flash_firmware(
    opts: &Options,
    image_path: &Path,
    part: Option<FlashPart>,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = FirmwareImage::new(read_file(image_path)?)?;
    let info = image.info();
    println!(
        "Firmware image: {} bytes, {}, reset handler 0x{:08x}",
        image.data().len(),
        if info.bootable { "bootable" } else { "not bootable" },
        info.reset_handler
    );
    println!("Target: {}", info.partition);

    let blocks = config_blocks_for(opts, part)?;

    let mut device = opts.open_device()?;
    let mut orch = Orchestrator::new(opts.flashloader(&mut device)?);

    let (mcu, flash) = orch.prepare(&blocks, part)?;
    println!("MCU: {}, flash: {}", mcu, flash);

    orch.program(&image)?;
    println!("Done!");

    Ok(())
}
