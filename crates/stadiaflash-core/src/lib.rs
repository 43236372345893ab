//! stadiaflash-core - Device communication core for the controller reflasher
//!
//! This crate holds everything that does not touch USB directly: the
//! [`ReportChannel`](report::ReportChannel) seam, the bounded report queue
//! used by transports, the SDP and Flashloader protocol clients, and the
//! orchestrator that identifies the hardware and programs firmware images.
//!
//! # Example
//!
//! ```no_run
//! use stadiaflash_core::firmware::FirmwareImage;
//! use stadiaflash_core::flashloader::Flashloader;
//! use stadiaflash_core::orchestrator::{ConfigBlocks, Orchestrator};
//! use stadiaflash_core::{ReportChannel, Result};
//!
//! fn flash<C: ReportChannel>(
//!     channel: &mut C,
//!     blocks: &ConfigBlocks,
//!     image: &FirmwareImage,
//! ) -> Result<()> {
//!     let mut orch = Orchestrator::new(Flashloader::new(channel)?);
//!     orch.prepare(blocks, None)?;
//!     orch.program(image)
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod controller;
pub mod error;
pub mod firmware;
pub mod flashloader;
pub mod flexspi;
pub mod hardware;
pub mod mode;
pub mod orchestrator;
pub mod report;
pub mod sdp;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, ErrorKind, ImageError, Result};
pub use mode::{DeviceMode, UsbId};
pub use report::{QueuePolicy, ReportChannel, ReportQueue};
