//! Mock HID transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{HidTransport, TransportError};
use crate::protocol::constants::{WATCH_PRODUCT_ID, WATCH_VENDOR_ID};
use crate::protocol::{ErrorFlags, Status};

/// Mock transport for unit testing session logic.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued input reports to return on read.
    report_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Detach once this many writes have been captured.
    detach_after: Arc<Mutex<Option<usize>>>,
    /// Simulated VID/PID.
    vid: u16,
    pid: u16,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            report_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            detach_after: Arc::new(Mutex::new(None)),
            vid: WATCH_VENDOR_ID,
            pid: WATCH_PRODUCT_ID,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue a raw input report to be returned on next read.
    pub fn queue_report(&self, report: &[u8]) {
        self.report_queue.lock().unwrap().push_back(report.to_vec());
    }

    /// Queue an encoded status report.
    pub fn queue_status(&self, status: Status) {
        self.queue_report(&status.to_bytes());
    }

    /// Queue a clean status answering `last_command`.
    pub fn queue_ok(&self, last_command: u32) {
        self.queue_status(Status::ok(last_command));
    }

    /// Queue a status carrying raw error bits.
    pub fn queue_flags(&self, last_command: u32, flags: u32) {
        self.queue_status(Status {
            flags: ErrorFlags::from_bits_retain(flags),
            ..Status::ok(last_command)
        });
    }

    /// Number of reports still queued.
    pub fn pending_reports(&self) -> usize {
        self.report_queue.lock().unwrap().len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    /// Simulate the device rebooting right after accepting `writes` more reports.
    pub fn detach_after_writes(&self, writes: usize) {
        let total = self.write_log.lock().unwrap().len() + writes;
        *self.detach_after.lock().unwrap() = Some(total);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HidTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        let mut log = self.write_log.lock().unwrap();
        log.push(data.to_vec());
        if *self.detach_after.lock().unwrap() == Some(log.len()) {
            *self.connected.lock().unwrap() = false;
        }
        Ok(data.len())
    }

    fn read(&self, _max_len: usize) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.report_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Timeout { timeout_ms: 5000 })
    }

    fn read_timeout(&self, _max_len: usize, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        Ok(self
            .report_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
