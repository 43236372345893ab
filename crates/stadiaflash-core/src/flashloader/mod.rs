//! Flashloader command/response protocol
//!
//! Once the flashloader is running from RAM the device re-enumerates with a
//! new VID/PID and speaks a command/response protocol with optional data
//! stages. A logical call goes through
//! `send command -> await response(s) [-> data stage] -> done`.

mod client;
pub mod protocol;

pub use client::{Flashloader, FRAME_TIMEOUT};
pub use protocol::{memory_id, CommandTag, Packet, PacketFlags, ResponseTag};
