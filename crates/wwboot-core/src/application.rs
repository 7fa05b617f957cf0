//! Application personality of the watch.
//!
//! The application firmware only accepts output reports; it never answers with a status.

use tracing::{info, instrument};

use crate::error::Result;
use crate::protocol::{Command, WatchTime};
use crate::transport::{HidTransport, ReportFraming};

/// Write-only session against a watch running its application firmware.
pub struct ApplicationSession<T: HidTransport> {
    transport: T,
}

impl<T: HidTransport> ApplicationSession<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send(&self, command: &Command) -> Result<()> {
        let framed = ReportFraming::ReportId.frame(&command.to_bytes());
        self.transport.write(&framed)?;
        Ok(())
    }

    /// Set the watch clock.
    #[instrument(skip(self))]
    pub fn set_time(&self, time: WatchTime) -> Result<()> {
        self.send(&Command::set_time(time))?;
        info!(%time, "Watch time set");
        Ok(())
    }

    /// Reboot the watch into its bootloader.
    #[instrument(skip(self))]
    pub fn enter_bootloader(&self) -> Result<()> {
        self.send(&Command::enter_bootloader())?;
        info!("Requested bootloader entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_set_time_report() {
        let mock = MockTransport::new();
        let session = ApplicationSession::new(mock.clone());
        session
            .set_time(WatchTime {
                year: 24,
                month: 3,
                day: 9,
                hour: 13,
                minute: 5,
                second: 59,
            })
            .unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 1);
        let report = &writes[0];
        assert_eq!(report.len(), REPORT_SIZE + 1);
        assert_eq!(report[0], 0);
        assert_eq!(&report[1..5], &CMD_SET_TIME.to_le_bytes());
        assert_eq!(&report[5..11], &[24, 3, 9, 13, 5, 59]);
        assert!(report[11..].iter().all(|&b| b == 0));
        // No status is expected
        assert_eq!(mock.pending_reports(), 0);
    }

    #[test]
    fn test_enter_bootloader_report() {
        let mock = MockTransport::new();
        ApplicationSession::new(mock.clone())
            .enter_bootloader()
            .unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes[0][0], 0);
        assert_eq!(&writes[0][1..5], &CMD_ENTER_BOOTLOADER.to_le_bytes());
    }

    #[test]
    fn test_disconnected_write_fails() {
        let mock = MockTransport::new();
        mock.disconnect();
        assert!(ApplicationSession::new(mock).enter_bootloader().is_err());
    }
}
