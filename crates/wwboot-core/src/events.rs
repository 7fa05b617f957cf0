//! Event system for UI decoupling.
//!
//! Front-ends subscribe to flashing progress through [`FlashObserver`] instead of scraping logs.

use std::fmt;

/// Phases of a firmware update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    /// Image is being read and paged.
    Loading,
    /// Bootloader is being reset before programming.
    Reset,
    /// Pages are being written.
    Programming,
    /// Asking the bootloader to start the application.
    Exit,
    Complete,
    Error,
}

impl fmt::Display for FlashPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashPhase::Loading => write!(f, "Loading"),
            FlashPhase::Reset => write!(f, "Reset"),
            FlashPhase::Programming => write!(f, "Programming"),
            FlashPhase::Exit => write!(f, "Exit"),
            FlashPhase::Complete => write!(f, "Complete"),
            FlashPhase::Error => write!(f, "Error"),
        }
    }
}

/// Events emitted while flashing.
#[derive(Debug, Clone)]
pub enum FlashEvent {
    /// Device connected.
    DeviceConnected { vid: u16, pid: u16 },
    /// Device dropped off the bus.
    DeviceDisconnected,
    /// Phase changed.
    PhaseChanged { from: FlashPhase, to: FlashPhase },
    /// Pages written so far out of the total.
    Progress { current: u64, total: u64 },
    /// One page accepted by the bootloader.
    PageProgrammed { address: u32, attempt: u32 },
    /// One attempt at a page failed.
    PageFailed {
        address: u32,
        attempt: u32,
        message: String,
    },
    /// HID report sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// Update finished.
    Complete,
}

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving flash events.
pub trait FlashObserver: Send + Sync {
    fn on_event(&self, event: &FlashEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl FlashObserver for NullObserver {
    fn on_event(&self, _event: &FlashEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl FlashObserver for TracingObserver {
    fn on_event(&self, event: &FlashEvent) {
        match event {
            FlashEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            FlashEvent::DeviceDisconnected => {
                tracing::info!("Device disconnected");
            }
            FlashEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            FlashEvent::Progress { current, total } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(page = current, total = total, progress = %format!("{}%", pct), "Progress");
            }
            FlashEvent::PageProgrammed { address, attempt } => {
                tracing::debug!(address = %format!("0x{:08X}", address), attempt, "Page programmed");
            }
            FlashEvent::PageFailed {
                address,
                attempt,
                message,
            } => {
                tracing::warn!(address = %format!("0x{:08X}", address), attempt, "Page failed: {}", message);
            }
            FlashEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "HID report");
            }
            FlashEvent::Complete => {
                tracing::info!("Update complete");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Observer that records every event.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub events: Mutex<Vec<FlashEvent>>,
    }

    impl FlashObserver for RecordingObserver {
        fn on_event(&self, event: &FlashEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(FlashPhase::Programming.to_string(), "Programming");
        assert_eq!(PacketDirection::Rx.to_string(), "RX");
    }

    #[test]
    fn test_recording_observer() {
        let observer = RecordingObserver::default();
        observer.on_event(&FlashEvent::Progress {
            current: 1,
            total: 4,
        });
        observer.on_event(&FlashEvent::Complete);
        TracingObserver.on_event(&FlashEvent::Complete);
        NullObserver.on_event(&FlashEvent::Complete);
        assert_eq!(observer.events.lock().unwrap().len(), 2);
    }
}
