//! Serial Download Protocol (boot ROM)
//!
//! While the MCU sits in its boot ROM it enumerates as an SDP HID device.
//! SDP can only do a handful of things; this crate uses it to place the
//! flashloader image in RAM and jump to it.
//!
//! All multi-byte fields on the wire are big-endian.

mod client;
pub mod protocol;

pub use client::Sdp;
pub use protocol::CommandType;
