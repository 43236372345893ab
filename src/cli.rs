//! CLI argument parsing

use clap::{Parser, Subcommand};
use stadiaflash_core::hardware::FlashPart;
use stadiaflash_core::QueuePolicy;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "stadiaflash")]
#[command(author, version, about = "Game controller firmware flasher", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding the flashloader image and configuration blocks
    /// Defaults to ./data/, /usr/share/stadiaflash/ or /usr/local/share/stadiaflash/
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Receive queue discipline (fifo, or lifo to mimic the stock tool)
    #[arg(long, global = true, default_value = "fifo")]
    pub queue_policy: QueuePolicy,

    /// Per-frame response timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Only use the controller whose serial number contains this string
    #[arg(long, global = true)]
    pub serial: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List attached controllers
    List,

    /// Show serial, firmware and battery info (OEM mode)
    Info,

    /// Load the flashloader into RAM and start it (SDP mode)
    Flashloader {
        /// Flashloader image (defaults to restricted_ivt_flashloader.bin in the data directory)
        loader: Option<PathBuf>,
    },

    /// Program a signed firmware image (flashloader mode)
    FlashFirmware {
        /// Signed firmware image
        image: PathBuf,

        /// Skip flash detection and assume this part (Giga-16m, Winbond-16m)
        #[arg(long)]
        flash: Option<FlashPart>,
    },

    /// Dump a flash range to a file (flashloader mode)
    Dump {
        /// Start offset in flash (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        start: u32,

        /// End offset in flash, exclusive (hex or decimal)
        #[arg(value_parser = parse_hex_u32)]
        end: u32,

        /// Output file path
        output: PathBuf,

        /// Give up on a word after this many retries (default: retry forever)
        #[arg(long)]
        retries: Option<u32>,

        /// Skip flash detection and assume this part (Giga-16m, Winbond-16m)
        #[arg(long)]
        flash: Option<FlashPart>,
    },

    /// Reset the device (flashloader mode)
    Reset,
}
