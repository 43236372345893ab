//! HID device discovery and the threaded report channel
//!
//! Interrupt IN reports are read by a background thread and buffered in a
//! [`ReportQueue`] so that nothing is lost while the protocol thread is busy
//! writing. Outbound reports go to the interrupt OUT endpoint when the
//! interface has one, otherwise through a SET_REPORT control request.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nusb::descriptors::TransferType;
use nusb::transfer::{
    Buffer, ControlOut, ControlType, Direction, In, Interrupt, Out, Recipient, TransferError,
};
use nusb::{Device, DeviceInfo, Endpoint, Interface, MaybeFuture};
use stadiaflash_core::report::DEFAULT_QUEUE_CAPACITY;
use stadiaflash_core::{
    DeviceMode, Error as CoreError, QueuePolicy, ReportChannel, ReportQueue, Result as CoreResult,
    UsbId,
};

use crate::error::{HidError, Result};
use crate::protocol::*;

/// HID transport configuration
#[derive(Debug, Clone)]
pub struct HidConfig {
    /// Only use a controller whose serial number contains this string
    pub serial: Option<String>,
    /// Receive queue discipline
    pub queue_policy: QueuePolicy,
    /// Receive queue capacity in reports
    pub queue_capacity: usize,
    /// How long one interrupt IN transfer waits before it is resubmitted
    pub poll_timeout: Duration,
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            serial: None,
            queue_policy: QueuePolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_timeout: Duration::from_millis(100),
        }
    }
}

/// An attached controller
#[derive(Debug, Clone)]
pub struct ControllerInfo {
    /// Mode the controller is in
    pub mode: DeviceMode,
    /// USB serial number, when readable
    pub serial: Option<String>,
    /// USB bus
    pub bus: String,
    /// USB device address
    pub address: u8,
    info: DeviceInfo,
}

impl ControllerInfo {
    fn from_device_info(info: DeviceInfo) -> Option<Self> {
        let mode = DeviceMode::from_usb_id(UsbId::new(info.vendor_id(), info.product_id()))?;
        Some(Self {
            mode,
            serial: info.serial_number().map(str::to_string),
            bus: info.bus_id().to_string(),
            address: info.device_address(),
            info,
        })
    }

    /// USB ids of the controller
    pub fn usb_id(&self) -> UsbId {
        self.mode.usb_id()
    }

    /// Open the underlying USB device
    pub(crate) fn open_device(&self) -> Result<Device> {
        log::debug!(
            "Opening {} at bus {} address {}",
            self.usb_id(),
            self.bus,
            self.address
        );
        self.info
            .open()
            .wait()
            .map_err(|e| HidError::OpenFailed(e.to_string()))
    }
}

impl fmt::Display for ControllerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) at bus {} address {}",
            self.mode,
            self.usb_id(),
            self.bus,
            self.address
        )?;
        if let Some(serial) = &self.serial {
            write!(f, ", serial {}", serial)?;
        }
        Ok(())
    }
}

fn serial_matches(serial: Option<&str>, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(filter) => serial.is_some_and(|s| s.contains(filter)),
    }
}

/// List attached controllers in any known mode
///
/// Controllers are ordered by mode: flashloader, OEM, bootloader, SDP.
pub fn list_controllers() -> Result<Vec<ControllerInfo>> {
    let mut controllers: Vec<ControllerInfo> = nusb::list_devices()
        .wait()
        .map_err(|e| HidError::OpenFailed(e.to_string()))?
        .filter_map(ControllerInfo::from_device_info)
        .collect();

    controllers.sort_by_key(|c| DeviceMode::ALL.iter().position(|m| *m == c.mode));
    Ok(controllers)
}

/// Find the first attached controller matching the serial filter
pub fn find_controller(serial: Option<&str>) -> Result<ControllerInfo> {
    let mut candidates: Vec<ControllerInfo> = list_controllers()?
        .into_iter()
        .filter(|c| serial_matches(c.serial.as_deref(), serial))
        .collect();

    if candidates.len() > 1 {
        log::warn!(
            "{} controllers attached, using the first one; pick another with --serial",
            candidates.len()
        );
    }
    if candidates.is_empty() {
        return Err(HidError::DeviceNotFound);
    }
    let controller = candidates.remove(0);
    log::info!("Found {}", controller);
    Ok(controller)
}

/// Interrupt endpoints of a HID interface
pub(crate) struct HidEndpoints {
    pub interface_number: u8,
    pub in_ep: u8,
    pub out_ep: Option<u8>,
}

fn find_hid_endpoints(device: &Device) -> Result<HidEndpoints> {
    let config = device
        .active_configuration()
        .map_err(|e| HidError::OpenFailed(format!("Failed to get config: {}", e)))?;

    let iface = config
        .interface_alt_settings()
        .find(|iface| iface.class() == HID_INTERFACE_CLASS)
        .ok_or(HidError::NoHidInterface)?;

    let mut in_ep = None;
    let mut out_ep = None;
    for ep in iface.endpoints() {
        if ep.transfer_type() != TransferType::Interrupt {
            continue;
        }
        match ep.direction() {
            Direction::In => in_ep = Some(ep.address()),
            Direction::Out => out_ep = Some(ep.address()),
        }
    }

    Ok(HidEndpoints {
        interface_number: iface.interface_number(),
        in_ep: in_ep.ok_or(HidError::NoInEndpoint)?,
        out_ep,
    })
}

/// Claim the HID interface of `device`, detaching a kernel driver if bound
pub(crate) fn claim_hid_interface(device: &Device) -> Result<(Interface, HidEndpoints)> {
    let endpoints = find_hid_endpoints(device)?;
    let interface = device
        .detach_and_claim_interface(endpoints.interface_number)
        .wait()
        .map_err(|e| HidError::ClaimFailed(e.to_string()))?;
    Ok((interface, endpoints))
}

/// A HID report channel to one controller
pub struct HidDevice {
    usb_id: UsbId,
    interface: Interface,
    interface_number: u8,
    out_ep: Option<Endpoint<Interrupt, Out>>,
    queue: Arc<ReportQueue>,
    shutdown: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl HidDevice {
    /// Open a controller and start receiving reports
    pub fn open(controller: &ControllerInfo, config: &HidConfig) -> Result<Self> {
        let device = controller.open_device()?;
        let (interface, endpoints) = claim_hid_interface(&device)?;

        log::debug!(
            "Using interface {}, IN EP 0x{:02X}, OUT EP {}",
            endpoints.interface_number,
            endpoints.in_ep,
            endpoints
                .out_ep
                .map(|ep| format!("0x{:02X}", ep))
                .unwrap_or_else(|| "none (SET_REPORT)".to_string())
        );

        let in_ep = interface
            .endpoint::<Interrupt, In>(endpoints.in_ep)
            .map_err(|e| HidError::ClaimFailed(e.to_string()))?;
        let out_ep = endpoints
            .out_ep
            .map(|addr| interface.endpoint::<Interrupt, Out>(addr))
            .transpose()
            .map_err(|e| HidError::ClaimFailed(e.to_string()))?;

        let queue = Arc::new(ReportQueue::new(config.queue_policy, config.queue_capacity));
        let shutdown = Arc::new(AtomicBool::new(false));

        let receiver = {
            let queue = Arc::clone(&queue);
            let shutdown = Arc::clone(&shutdown);
            let poll_timeout = config.poll_timeout;
            thread::Builder::new()
                .name("hid-receiver".into())
                .spawn(move || receive_loop(in_ep, &queue, &shutdown, poll_timeout))
                .map_err(|e| HidError::OpenFailed(format!("Failed to start receiver: {}", e)))?
        };

        Ok(Self {
            usb_id: controller.usb_id(),
            interface,
            interface_number: endpoints.interface_number,
            out_ep,
            queue,
            shutdown,
            receiver: Some(receiver),
        })
    }

    /// Number of reports waiting in the receive queue
    pub fn queued_reports(&self) -> usize {
        self.queue.len()
    }

    fn set_report(&self, report: &[u8]) -> Result<()> {
        let report_id = report.first().copied().unwrap_or(0);
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: HID_SET_REPORT,
                    value: HID_REPORT_TYPE_OUTPUT | report_id as u16,
                    index: self.interface_number as u16,
                    data: report,
                },
                WRITE_TIMEOUT,
            )
            .wait()
            .map_err(|e| HidError::TransferFailed(format!("SET_REPORT failed: {}", e)))
    }
}

fn receive_loop(
    mut in_ep: Endpoint<Interrupt, In>,
    queue: &ReportQueue,
    shutdown: &AtomicBool,
    poll_timeout: Duration,
) {
    let max_packet_size = in_ep.max_packet_size();

    while !shutdown.load(Ordering::Relaxed) {
        let mut buf = Buffer::new(max_packet_size);
        buf.set_requested_len(max_packet_size);

        match in_ep.transfer_blocking(buf, poll_timeout).into_result() {
            Ok(data) if data.is_empty() => {}
            Ok(data) => {
                log::trace!("HID IN {:02X?}", &data[..]);
                queue.push(data.to_vec());
            }
            // poll timeout, nothing arrived
            Err(TransferError::Cancelled) => {}
            Err(e) => {
                log::debug!("HID receiver stopping: {}", e);
                queue.stop(format!("interrupt IN transfer failed: {}", e));
                return;
            }
        }
    }

    queue.stop("device closed");
}

impl ReportChannel for HidDevice {
    fn usb_id(&self) -> UsbId {
        self.usb_id
    }

    fn write_report(&mut self, report: &[u8]) -> CoreResult<()> {
        log::trace!("HID OUT {:02X?}", report);
        match self.out_ep.as_mut() {
            Some(out_ep) => {
                let mut buf = Buffer::new(report.len());
                buf.extend_from_slice(report);
                out_ep
                    .transfer_blocking(buf, WRITE_TIMEOUT)
                    .into_result()
                    .map_err(|e| CoreError::Transport(format!("interrupt OUT failed: {}", e)))?;
                Ok(())
            }
            None => Ok(self.set_report(report)?),
        }
    }

    fn read_report(&mut self, timeout: Option<Duration>) -> CoreResult<Option<Vec<u8>>> {
        self.queue.pop(timeout)
    }
}

impl Drop for HidDevice {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(receiver) = self.receiver.take() {
            if receiver.join().is_err() {
                log::warn!("HID receiver thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HidConfig::default();
        assert_eq!(config.queue_capacity, 30);
        assert_eq!(config.queue_policy, QueuePolicy::Fifo);
        assert_eq!(config.poll_timeout, Duration::from_millis(100));
        assert!(config.serial.is_none());
    }

    #[test]
    fn test_serial_filter() {
        assert!(serial_matches(None, None));
        assert!(serial_matches(Some("9A01234567"), None));
        assert!(serial_matches(Some("9A01234567"), Some("0123")));
        assert!(!serial_matches(Some("9A01234567"), Some("9B")));
        assert!(!serial_matches(None, Some("9A")));
    }
}
