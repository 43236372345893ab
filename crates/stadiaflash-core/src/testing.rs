//! In-memory device doubles used by the unit tests

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::flashloader::protocol::*;
use crate::flexspi::{regs, FLEXSPI_BASE, IPCMD_TRIGGER};
use crate::mode::{DeviceMode, UsbId};
use crate::report::ReportChannel;

/// Replays queued inbound reports and records everything written
pub(crate) struct ScriptedChannel {
    pub usb_id: UsbId,
    pub written: Vec<Vec<u8>>,
    pub inbound: VecDeque<Vec<u8>>,
}

impl ScriptedChannel {
    pub fn new(usb_id: UsbId) -> Self {
        Self {
            usb_id,
            written: Vec::new(),
            inbound: VecDeque::new(),
        }
    }

    pub fn queue(&mut self, report: Vec<u8>) {
        self.inbound.push_back(report);
    }
}

impl ReportChannel for ScriptedChannel {
    fn usb_id(&self) -> UsbId {
        self.usb_id
    }

    fn write_report(&mut self, report: &[u8]) -> Result<()> {
        self.written.push(report.to_vec());
        Ok(())
    }

    fn read_report(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        match self.inbound.pop_front() {
            Some(report) => Ok(Some(report)),
            None if timeout.is_some() => Err(Error::Timeout),
            None => Ok(None),
        }
    }
}

/// Operations the simulated flashloader has executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    Fill { address: u32, value: u32 },
    Read { address: u32, len: u32 },
    Erase { address: u32, len: u32 },
    Write { address: u32, len: u32 },
    Configure { memory_id: u32, address: u32 },
    Reset,
}

struct PendingWrite {
    address: u32,
    len: usize,
    data: Vec<u8>,
}

/// A flashloader backed by a sparse word map
///
/// Unset words read as zero. Triggering a FlexSPI IP command latches the
/// flash reader's value for the offset in IPCR0 into RFDR0.
pub(crate) struct SimulatedFlashloader {
    words: HashMap<u32, u32>,
    ops: Vec<Op>,
    writes: Vec<(u32, Vec<u8>)>,
    data_frames: Vec<usize>,
    pending: Option<PendingWrite>,
    outbound: VecDeque<Vec<u8>>,
    failing_reads: usize,
    reads_until_stop: Option<usize>,
    stopped: bool,
    stall_next: bool,
    flash_reader: Box<dyn Fn(u32) -> u32>,
    silent_reset: bool,
}

impl SimulatedFlashloader {
    pub fn new() -> Self {
        Self {
            words: HashMap::new(),
            ops: Vec::new(),
            writes: Vec::new(),
            data_frames: Vec::new(),
            pending: None,
            outbound: VecDeque::new(),
            failing_reads: 0,
            reads_until_stop: None,
            stopped: false,
            stall_next: false,
            flash_reader: Box::new(|_| 0xFFFF_FFFF),
            silent_reset: false,
        }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn fills(&self) -> Vec<(u32, u32)> {
        self.ops
            .iter()
            .filter_map(|op| match *op {
                Op::Fill { address, value } => Some((address, value)),
                _ => None,
            })
            .collect()
    }

    pub fn erases(&self) -> Vec<(u32, u32)> {
        self.ops
            .iter()
            .filter_map(|op| match *op {
                Op::Erase { address, len } => Some((address, len)),
                _ => None,
            })
            .collect()
    }

    pub fn data_frame_sizes(&self) -> &[usize] {
        &self.data_frames
    }

    /// Data of the most recent completed write at `address`
    pub fn written_at(&self, address: u32) -> Option<&[u8]> {
        self.writes
            .iter()
            .rev()
            .find(|(at, _)| *at == address)
            .map(|(_, data)| data.as_slice())
    }

    pub fn word(&self, address: u32) -> u32 {
        self.words.get(&address).copied().unwrap_or(0)
    }

    pub fn set_word(&mut self, address: u32, value: u32) {
        self.words.insert(address, value);
    }

    pub fn set_flash_reader(&mut self, reader: impl Fn(u32) -> u32 + 'static) {
        self.flash_reader = Box::new(reader);
    }

    /// Fail the next `count` READ_MEMORY commands with a non-zero status
    pub fn fail_next_reads(&mut self, count: usize) {
        self.failing_reads = count;
    }

    /// Answer `count` more READ_MEMORY commands, then behave like a receiver
    /// that died on a USB error
    pub fn stop_after_reads(&mut self, count: usize) {
        self.reads_until_stop = Some(count);
    }

    /// Report a timeout on the next timed read while keeping the queued
    /// frames, as if the answer arrived just too late
    pub fn stall_next_response(&mut self) {
        self.stall_next = true;
    }

    /// Do not answer RESET
    pub fn set_silent_reset(&mut self, silent: bool) {
        self.silent_reset = silent;
    }

    fn respond(&mut self, tag: ResponseTag, flags: PacketFlags, params: &[u32]) {
        let packet = Packet::response(tag, flags, params);
        self.outbound
            .push_back(encode_frame(REPORT_COMMAND_IN, &packet.to_bytes()));
    }

    fn generic(&mut self, status: u32, tag: u8) {
        self.respond(ResponseTag::Generic, PacketFlags::empty(), &[status, tag as u32]);
    }

    fn param(packet: &Packet, index: usize) -> u32 {
        packet.parameters.get(index).copied().unwrap_or(0)
    }

    fn handle_command(&mut self, packet: Packet) {
        let p0 = Self::param(&packet, 0);
        let p1 = Self::param(&packet, 1);
        let p2 = Self::param(&packet, 2);

        match packet.tag {
            t if t == CommandTag::FlashEraseRegion as u8 => {
                self.ops.push(Op::Erase { address: p0, len: p1 });
                self.generic(0, t);
            }
            t if t == CommandTag::ReadMemory as u8 => {
                self.ops.push(Op::Read { address: p0, len: p1 });
                match self.reads_until_stop {
                    Some(0) => {
                        self.stopped = true;
                        return;
                    }
                    Some(ref mut left) => *left -= 1,
                    None => {}
                }
                if self.failing_reads > 0 {
                    self.failing_reads -= 1;
                    self.respond(ResponseTag::ReadMemory, PacketFlags::empty(), &[0x2711, 0]);
                    return;
                }

                self.respond(ResponseTag::ReadMemory, PacketFlags::HAS_DATA_PHASE, &[0, p1]);
                let data: Vec<u8> = (0..p1)
                    .map(|i| {
                        let at = p0.wrapping_add(i);
                        self.word(at & !3).to_le_bytes()[(at & 3) as usize]
                    })
                    .collect();
                for chunk in data.chunks(32) {
                    self.outbound.push_back(encode_frame(REPORT_DATA_IN, chunk));
                }
                self.generic(0, t);
            }
            t if t == CommandTag::WriteMemory as u8 => {
                self.ops.push(Op::Write { address: p0, len: p1 });
                self.pending = Some(PendingWrite {
                    address: p0,
                    len: p1 as usize,
                    data: Vec::new(),
                });
                self.generic(0, t);
                self.complete_write();
            }
            t if t == CommandTag::FillMemory as u8 => {
                self.ops.push(Op::Fill { address: p0, value: p2 });
                for offset in (0..p1).step_by(4) {
                    self.set_word(p0.wrapping_add(offset), p2);
                }
                if p0 == FLEXSPI_BASE + regs::IPCMD && p2 & IPCMD_TRIGGER != 0 {
                    let offset = self.word(FLEXSPI_BASE + regs::IPCR0);
                    let value = (self.flash_reader)(offset);
                    self.set_word(FLEXSPI_BASE + regs::RFDR0, value);
                }
                self.generic(0, t);
            }
            t if t == CommandTag::ConfigureMemory as u8 => {
                self.ops.push(Op::Configure {
                    memory_id: p0,
                    address: p1,
                });
                self.generic(0, t);
            }
            t if t == CommandTag::Reset as u8 => {
                self.ops.push(Op::Reset);
                if !self.silent_reset {
                    self.generic(0, t);
                }
            }
            t => self.generic(10000, t),
        }
    }

    fn complete_write(&mut self) {
        let done = matches!(&self.pending, Some(p) if p.data.len() >= p.len);
        if !done {
            return;
        }
        if let Some(pending) = self.pending.take() {
            self.writes.push((pending.address, pending.data));
            self.generic(0, CommandTag::WriteMemory as u8);
        }
    }
}

impl ReportChannel for SimulatedFlashloader {
    fn usb_id(&self) -> UsbId {
        DeviceMode::Flashloader.usb_id()
    }

    fn write_report(&mut self, report: &[u8]) -> Result<()> {
        let (id, payload) = decode_frame(report)?;
        match id {
            REPORT_COMMAND_OUT => {
                let packet = Packet::from_bytes(payload)?;
                self.handle_command(packet);
            }
            REPORT_DATA_OUT => {
                self.data_frames.push(payload.len());
                if let Some(pending) = self.pending.as_mut() {
                    pending.data.extend_from_slice(payload);
                }
                self.complete_write();
            }
            other => panic!("unexpected outbound report id {}", other),
        }
        Ok(())
    }

    fn read_report(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        if timeout.is_some() && self.stall_next {
            self.stall_next = false;
            return Err(Error::Timeout);
        }
        match self.outbound.pop_front() {
            Some(report) => Ok(Some(report)),
            None if self.stopped => Err(Error::ReceiverStopped("device went away".into())),
            None if timeout.is_some() => Err(Error::Timeout),
            None => Ok(None),
        }
    }
}
