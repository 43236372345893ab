//! Flashloader bootstrap through the boot ROM

use stadiaflash_core::sdp::protocol::STATUS_WRITE_FILE_COMPLETE;
use stadiaflash_core::sdp::Sdp;
use stadiaflash_core::DeviceMode;
use std::path::Path;

use super::{byte_progress, Options};
use crate::data::{data_dir, read_file, FLASHLOADER_IMAGE};

/// RAM address the flashloader image is loaded to
pub const LOADER_ADDRESS: u32 = 0x2000_0000;
/// Flashloader entry point
pub const LOADER_ENTRY: u32 = 0x2000_0400;

/// Upload the flashloader over SDP and jump to it
pub fn run_flashloader(
    opts: &Options,
    loader: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = match loader {
        Some(path) => read_file(path)?,
        None => read_file(&data_dir(opts.data_dir.as_deref())?.join(FLASHLOADER_IMAGE))?,
    };
    println!("Flashloader image is {} bytes", image.len());

    let mut device = opts.open_device()?;
    let mut sdp = Sdp::new(&mut device)?;

    let pb = byte_progress(image.len() as u64)?;
    let status = sdp.write_file_with_progress(LOADER_ADDRESS, &image, |sent| {
        pb.set_position(sent as u64)
    })?;
    pb.finish_and_clear();
    println!("SDP load result: 0x{:08x}", status);

    if status != STATUS_WRITE_FILE_COMPLETE {
        match sdp.error_status() {
            Ok(error) => log::warn!("Boot ROM error status: 0x{:08x}", error),
            Err(e) => log::warn!("Failed to query boot ROM error status: {}", e),
        }
    }

    sdp.jump_address(LOADER_ENTRY)?;
    println!(
        "Jumped to 0x{:08x}; the controller should now enumerate as {}",
        LOADER_ENTRY,
        DeviceMode::Flashloader.usb_id()
    );

    Ok(())
}
