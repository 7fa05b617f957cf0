//! Device identity and selection.
//!
//! Both personalities of the watch enumerate with the same VID/PID and are told apart by their
//! string descriptors. Selection is a pure lookup over an enumeration snapshot.

use std::fmt;

use crate::protocol::constants::*;
use crate::transport::ReportFraming;

/// Which firmware the watch is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Bootloader,
    Application,
}

impl DeviceKind {
    pub fn manufacturer(&self) -> &'static str {
        WATCH_MANUFACTURER
    }

    pub fn product(&self) -> &'static str {
        match self {
            DeviceKind::Bootloader => BOOTLOADER_PRODUCT,
            DeviceKind::Application => APPLICATION_PRODUCT,
        }
    }

    pub fn framing(&self) -> ReportFraming {
        match self {
            DeviceKind::Bootloader => ReportFraming::Bare,
            DeviceKind::Application => ReportFraming::ReportId,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Bootloader => write!(f, "bootloader"),
            DeviceKind::Application => write!(f, "application"),
        }
    }
}

/// One device from an enumeration snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
    pub bus: String,
    pub address: u8,
}

impl DeviceEntry {
    /// Identify the personality, if this is a watch at all.
    pub fn kind(&self) -> Option<DeviceKind> {
        if self.vendor_id != WATCH_VENDOR_ID || self.product_id != WATCH_PRODUCT_ID {
            return None;
        }
        [DeviceKind::Bootloader, DeviceKind::Application]
            .into_iter()
            .find(|kind| {
                self.manufacturer.as_deref() == Some(kind.manufacturer())
                    && self.product.as_deref() == Some(kind.product())
            })
    }
}

impl fmt::Display for DeviceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X}:{:04X} bus {} addr {} \"{}\"",
            self.vendor_id,
            self.product_id,
            self.bus,
            self.address,
            self.product.as_deref().unwrap_or("?")
        )?;
        if let Some(serial) = &self.serial {
            write!(f, " serial {serial}")?;
        }
        Ok(())
    }
}

/// Position of the first device of the given personality in `entries`.
pub fn find_device_index(entries: &[DeviceEntry], kind: DeviceKind) -> Option<usize> {
    entries.iter().position(|e| e.kind() == Some(kind))
}

/// First device of the given personality in `entries`.
pub fn find_device(entries: &[DeviceEntry], kind: DeviceKind) -> Option<&DeviceEntry> {
    find_device_index(entries, kind).map(|i| &entries[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(vid: u16, pid: u16, manufacturer: &str, product: &str) -> DeviceEntry {
        DeviceEntry {
            vendor_id: vid,
            product_id: pid,
            manufacturer: Some(manufacturer.to_string()),
            product: Some(product.to_string()),
            serial: None,
            bus: "1".to_string(),
            address: 4,
        }
    }

    #[test]
    fn test_kind_from_descriptors() {
        let boot = entry(0x16C0, 0x05DC, "kevincuzner.com", "LED Wristwatch Bootloader");
        let app = entry(0x16C0, 0x05DC, "kevincuzner.com", "LED Wristwatch");
        let other = entry(0x16C0, 0x05DC, "someone.else", "LED Wristwatch");
        let foreign = entry(0x8086, 0x05DC, "kevincuzner.com", "LED Wristwatch");

        assert_eq!(boot.kind(), Some(DeviceKind::Bootloader));
        assert_eq!(app.kind(), Some(DeviceKind::Application));
        assert_eq!(other.kind(), None);
        assert_eq!(foreign.kind(), None);
    }

    #[test]
    fn test_find_device_in_snapshot() {
        let snapshot = vec![
            entry(0x046D, 0xC52B, "Logitech", "Receiver"),
            entry(0x16C0, 0x05DC, "kevincuzner.com", "LED Wristwatch"),
            entry(0x16C0, 0x05DC, "kevincuzner.com", "LED Wristwatch Bootloader"),
        ];
        assert_eq!(find_device_index(&snapshot, DeviceKind::Bootloader), Some(2));
        assert_eq!(
            find_device(&snapshot, DeviceKind::Application).map(|e| e.address),
            Some(4)
        );
        assert!(find_device(&snapshot[..1], DeviceKind::Application).is_none());
    }

    #[test]
    fn test_framing_per_kind() {
        assert_eq!(DeviceKind::Bootloader.framing(), ReportFraming::Bare);
        assert_eq!(DeviceKind::Application.framing(), ReportFraming::ReportId);
    }
}
