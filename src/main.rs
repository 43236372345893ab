//! stadiaflash - Firmware flasher for NXP i.MX RT based game controllers
//!
//! The controller is walked through its USB personalities:
//!
//! 1. boot ROM (SDP): `stadiaflash flashloader` uploads and starts the
//!    flashloader
//! 2. flashloader: `stadiaflash flash-firmware <image>` identifies the MCU
//!    and flash, programs the image into its partition and resets
//!
//! `info` talks to the normal firmware, `dump` reads flash back through the
//! flashloader.

mod cli;
mod commands;
mod data;

use clap::Parser;
use cli::{Cli, Commands};
use commands::Options;
use stadiaflash_core::{Error as CoreError, ErrorKind};
use stadiaflash_hid::HidError;
use std::time::Duration;

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        if let Some(hint) = hint(e.as_ref()) {
            eprintln!("Hint: {}", hint);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let opts = Options {
        data_dir: cli.data_dir,
        queue_policy: cli.queue_policy,
        frame_timeout: cli.timeout_ms.map(Duration::from_millis),
        serial: cli.serial,
    };
    log::debug!("Receive queue policy: {}", opts.queue_policy);

    match cli.command {
        Commands::List => commands::run_list(),
        Commands::Info => commands::run_info(&opts),
        Commands::Flashloader { loader } => commands::run_flashloader(&opts, loader.as_deref()),
        Commands::FlashFirmware { image, flash } => {
            commands::run_flash_firmware(&opts, &image, flash)
        }
        Commands::Dump {
            start,
            end,
            output,
            retries,
            flash,
        } => commands::run_dump(&opts, start, end, &output, retries, flash),
        Commands::Reset => commands::run_reset(&opts),
    }
}

/// Suggest a next step for a failure
fn hint(error: &(dyn std::error::Error + 'static)) -> Option<&'static str> {
    let core = match error.downcast_ref::<HidError>() {
        Some(HidError::Core(e)) => e,
        Some(HidError::DeviceNotFound) => {
            return Some("plug in the controller; hold the button combination for the wanted mode")
        }
        Some(HidError::ClaimFailed(_) | HidError::OpenFailed(_)) => {
            return Some("check USB permissions (udev rules) or run as root")
        }
        Some(_) => return None,
        None => error.downcast_ref::<CoreError>()?,
    };

    Some(match core.kind() {
        ErrorKind::DeviceIdentityMismatch => {
            "the controller is in the wrong mode for this command; see `stadiaflash list`"
        }
        ErrorKind::TransportTimeout => "the device stopped answering; try replugging it",
        ErrorKind::TransportHardwareFailure => "the USB connection failed; replug the controller",
        ErrorKind::CommandFailed => "the flashloader rejected a command; reset and start over",
        ErrorKind::ProtocolViolation => "unexpected data from the device; retry with -vv for a trace",
        ErrorKind::ImageFormatInvalid => "the file is not a signed firmware image",
        ErrorKind::UnknownHardware => "this MCU or flash part is not supported",
        ErrorKind::NoMatchingPartition => "the image does not target a known flash partition",
    })
}
