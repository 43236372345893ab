//! CLI command implementations
//!
//! Each subcommand expects the controller in one particular mode:
//!
//! - `info`: OEM (normal firmware running)
//! - `flashloader`: SDP (boot ROM)
//! - `flash-firmware`, `dump`, `reset`: flashloader
//!
//! `list` works in any mode.

mod dump;
mod flash;
mod flashloader;
mod info;
mod list;
mod reset;

pub use dump::run_dump;
pub use flash::run_flash_firmware;
pub use flashloader::run_flashloader;
pub use info::run_info;
pub use list::run_list;
pub use reset::run_reset;

use indicatif::{ProgressBar, ProgressStyle};
use stadiaflash_core::flashloader::Flashloader;
use stadiaflash_core::QueuePolicy;
use stadiaflash_hid::{find_controller, HidConfig, HidDevice};
use std::path::PathBuf;
use std::time::Duration;

/// Options shared by all device commands
#[derive(Debug, Clone)]
pub struct Options {
    /// Explicit data directory
    pub data_dir: Option<PathBuf>,
    /// Receive queue discipline
    pub queue_policy: QueuePolicy,
    /// Per-frame response timeout override
    pub frame_timeout: Option<Duration>,
    /// Serial number filter
    pub serial: Option<String>,
}

impl Options {
    fn hid_config(&self) -> HidConfig {
        HidConfig {
            serial: self.serial.clone(),
            queue_policy: self.queue_policy,
            ..HidConfig::default()
        }
    }

    /// Find and open the controller
    fn open_device(&self) -> Result<HidDevice, Box<dyn std::error::Error>> {
        let config = self.hid_config();
        let controller = find_controller(config.serial.as_deref())?;
        println!("Found: {}", controller);
        Ok(HidDevice::open(&controller, &config)?)
    }

    /// Attach a flashloader client, applying the timeout override
    fn flashloader<'a>(
        &self,
        device: &'a mut HidDevice,
    ) -> Result<Flashloader<'a, HidDevice>, Box<dyn std::error::Error>> {
        let loader = Flashloader::new(device)?;
        Ok(match self.frame_timeout {
            Some(timeout) => loader.with_frame_timeout(timeout),
            None => loader,
        })
    }
}

/// Byte progress bar used for long transfers
fn byte_progress(total: u64) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
