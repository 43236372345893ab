//! HID report channel abstraction
//!
//! Protocol clients talk to the device through [`ReportChannel`], which
//! exchanges whole HID reports. The first byte of every report is the report
//! id selecting the logical channel; the rest is opaque to the transport.
//!
//! [`ReportQueue`] is the bounded buffer between a transport's background
//! receiver and the protocol thread. Its read/evict discipline is a
//! [`QueuePolicy`]:
//!
//! - [`QueuePolicy::Fifo`] reads the oldest report and, when full, drops the
//!   oldest to make room.
//! - [`QueuePolicy::Lifo`] reads the newest report and, when full, drops the
//!   newest queued report before appending. This is how the stock tooling
//!   behaves; it reorders frames whenever more than one is queued.

use core::fmt;
use core::str::FromStr;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::mode::UsbId;

/// Default number of reports buffered between receiver and reader
pub const DEFAULT_QUEUE_CAPACITY: usize = 30;

/// A bidirectional HID report channel
pub trait ReportChannel {
    /// USB ids of the device behind this channel
    fn usb_id(&self) -> UsbId;

    /// Send one report; does not wait for any answer
    fn write_report(&mut self, report: &[u8]) -> Result<()>;

    /// Receive one report
    ///
    /// With `timeout == None` this returns `Ok(None)` immediately when nothing
    /// is queued. With a timeout it blocks until a report arrives and returns
    /// [`Error::Timeout`] if none does.
    fn read_report(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>>;
}

/// Read/evict discipline of a [`ReportQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Oldest report first, drop oldest on overflow
    #[default]
    Fifo,
    /// Newest report first, drop newest on overflow
    Lifo,
}

impl FromStr for QueuePolicy {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fifo" => Ok(QueuePolicy::Fifo),
            "lifo" => Ok(QueuePolicy::Lifo),
            _ => Err(format!("Unknown queue policy: {}", s)),
        }
    }
}

impl fmt::Display for QueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuePolicy::Fifo => write!(f, "fifo"),
            QueuePolicy::Lifo => write!(f, "lifo"),
        }
    }
}

#[derive(Default)]
struct QueueState {
    reports: VecDeque<Vec<u8>>,
    /// Set once the producer has stopped for good
    stopped: Option<String>,
}

/// Bounded report queue shared between a receiver thread and a reader
pub struct ReportQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    policy: QueuePolicy,
    capacity: usize,
}

impl ReportQueue {
    /// Create an empty queue
    pub fn new(policy: QueuePolicy, capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            policy,
            capacity: capacity.max(1),
        }
    }

    /// Queue policy
    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Number of queued reports
    pub fn len(&self) -> usize {
        self.lock().reports.len()
    }

    /// Whether no report is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a report and wake a waiting reader
    pub fn push(&self, report: Vec<u8>) {
        let mut state = self.lock();
        if state.reports.len() >= self.capacity {
            let dropped = match self.policy {
                QueuePolicy::Fifo => state.reports.pop_front(),
                QueuePolicy::Lifo => state.reports.pop_back(),
            };
            if let Some(dropped) = dropped {
                log::warn!(
                    "Report queue full, dropping report id 0x{:02X}",
                    dropped.first().copied().unwrap_or(0)
                );
            }
        }
        state.reports.push_back(report);
        self.ready.notify_one();
    }

    /// Mark the producer as stopped and wake all readers
    ///
    /// Reports already queued stay readable; once drained, reads fail with
    /// [`Error::ReceiverStopped`].
    pub fn stop(&self, reason: impl Into<String>) {
        let mut state = self.lock();
        if state.stopped.is_none() {
            state.stopped = Some(reason.into());
        }
        self.ready.notify_all();
    }

    /// Take one report according to the queue policy
    pub fn pop(&self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        let mut state = self.lock();

        if state.reports.is_empty() {
            if let Some(reason) = &state.stopped {
                return Err(Error::ReceiverStopped(reason.clone()));
            }
            let Some(timeout) = timeout else {
                return Ok(None);
            };

            let (guard, _) = self
                .ready
                .wait_timeout_while(state, timeout, |s| {
                    s.reports.is_empty() && s.stopped.is_none()
                })
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;

            if state.reports.is_empty() {
                return Err(match &state.stopped {
                    Some(reason) => Error::ReceiverStopped(reason.clone()),
                    None => Error::Timeout,
                });
            }
        }

        Ok(match self.policy {
            QueuePolicy::Fifo => state.reports.pop_front(),
            QueuePolicy::Lifo => state.reports.pop_back(),
        })
    }
}
