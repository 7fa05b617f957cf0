//! HID transport layer abstraction.
//!
//! Defines the `HidTransport` trait for exchanging fixed-size reports,
//! allowing different implementations (nusb, mock, etc.).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X} product={product:?}")]
    DeviceNotFound {
        vid: u16,
        pid: u16,
        product: String,
    },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl TransportError {
    /// Whether the error means the device dropped off the bus.
    pub fn is_detach(&self) -> bool {
        matches!(self, TransportError::Disconnected)
    }
}

/// Report-ID convention of the device personality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFraming {
    /// Reports are sent as-is (bootloader).
    Bare,
    /// Reports are preceded by a zero report-ID byte (application).
    ReportId,
}

impl ReportFraming {
    /// Wrap a report for the transport write boundary.
    pub fn frame(&self, report: &[u8]) -> Vec<u8> {
        match self {
            ReportFraming::Bare => report.to_vec(),
            ReportFraming::ReportId => {
                let mut framed = Vec::with_capacity(report.len() + 1);
                framed.push(0);
                framed.extend_from_slice(report);
                framed
            }
        }
    }
}

/// Abstract HID transport interface.
///
/// Implementations are expected to close the underlying handle when dropped.
pub trait HidTransport {
    /// Write one framed output report.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read one input report, blocking until it arrives.
    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Read one input report, giving up after `timeout`.
    ///
    /// Returns an empty buffer when nothing arrived in time.
    fn read_timeout(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Check if device is still connected.
    fn is_connected(&self) -> bool;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

impl<T: HidTransport + ?Sized> HidTransport for &T {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).write(data)
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(max_len)
    }

    fn read_timeout(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read_timeout(max_len, timeout)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn vendor_id(&self) -> u16 {
        (**self).vendor_id()
    }

    fn product_id(&self) -> u16 {
        (**self).product_id()
    }
}
