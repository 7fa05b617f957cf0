//! Bootloader session - request/response driver for one open device.
//!
//! Every exchange writes a single command report and, except for reset, waits for exactly one
//! status report before the next command goes out. There is no pipelining.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, instrument, trace, warn};

use crate::block::Block;
use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::{Command, ResetStyle, Status};
use crate::transport::{HidTransport, ReportFraming, TransportError};

/// Step of the page-program exchange that a status answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStage {
    Start,
    LowerHalf,
    UpperHalf,
}

impl fmt::Display for ProgramStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramStage::Start => write!(f, "program-start"),
            ProgramStage::LowerHalf => write!(f, "lower half"),
            ProgramStage::UpperHalf => write!(f, "upper half"),
        }
    }
}

/// What happened after asking the bootloader to exit or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The device dropped off the bus, i.e. it rebooted out of the bootloader.
    LeftBootloader,
    /// The device answered and is still running the bootloader.
    RemainedInBootloader(Status),
}

impl ExitOutcome {
    pub fn left(&self) -> bool {
        matches!(self, ExitOutcome::LeftBootloader)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::LeftBootloader => write!(f, "device left bootloader"),
            ExitOutcome::RemainedInBootloader(status) => {
                write!(f, "device remained in bootloader ({status})")
            }
        }
    }
}

/// Tunables for a bootloader session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound for each polling read.
    pub poll_timeout: Duration,
    pub reset_style: ResetStyle,
    /// Require the final status of a page to echo the CRC32 of both halves.
    pub verify_crc_echo: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(STATUS_POLL_TIMEOUT_MS),
            reset_style: ResetStyle::default(),
            verify_crc_echo: false,
        }
    }
}

/// Exclusive driver of one transport handle talking to the bootloader.
///
/// The transport is dropped, and with it the device handle closed, when the session is.
pub struct BootloaderSession<T: HidTransport> {
    transport: T,
    options: SessionOptions,
}

impl<T: HidTransport> BootloaderSession<T> {
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, SessionOptions::default())
    }

    pub fn with_options(transport: T, options: SessionOptions) -> Self {
        Self { transport, options }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send(&self, command: &Command) -> Result<()> {
        let framed = ReportFraming::Bare.frame(&command.to_bytes());
        self.transport.write(&framed)?;
        trace!(code = %format!("0x{:08X}", command.code()), "Command sent");
        Ok(())
    }

    fn read_status(&self) -> Result<Status> {
        let report = self.transport.read(REPORT_SIZE)?;
        let status = Status::from_bytes(&report)?;
        trace!(%status, "Status received");
        Ok(status)
    }

    /// Send one command and block for its status.
    pub fn exchange(&self, command: &Command) -> Result<Status> {
        self.send(command)?;
        self.read_status()
    }

    fn checked_exchange(
        &self,
        command: &Command,
        address: u32,
        stage: ProgramStage,
    ) -> Result<Status> {
        let status = self.exchange(command)?;
        if !status.is_ok() {
            warn!(
                address = %format!("0x{:08X}", address),
                %stage,
                flags = %status.flags,
                "Bootloader reported an error"
            );
            return Err(Error::BootloaderProtocol {
                address,
                stage,
                flags: status.flags,
            });
        }
        Ok(status)
    }

    /// Wait up to `timeout` for a status report.
    ///
    /// Returns `None` if nothing arrived in time.
    pub fn poll_status(&self, timeout: Duration) -> Result<Option<Status>> {
        match self.transport.read_timeout(REPORT_SIZE, timeout) {
            Ok(report) if report.is_empty() => Ok(None),
            Ok(report) => Ok(Some(Status::from_bytes(&report)?)),
            Err(TransportError::Timeout { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Program one 128-byte, 128-aligned page.
    ///
    /// Stops at the first status with error bits set; a failed page must be retried from the
    /// start since the device state is unknown.
    #[instrument(skip(self, page), fields(address = %format!("0x{:08X}", page.address())))]
    pub fn program_page(&self, page: &Block) -> Result<Status> {
        let address = page.address();
        let invalid = || Error::InvalidPageBlock {
            address,
            len: page.len(),
        };
        if address as usize % PAGE_SIZE != 0 || page.len() != PAGE_SIZE {
            return Err(invalid());
        }

        let lower = page.subblock(0, HALF_PAGE_SIZE).ok_or_else(invalid)?;
        let upper = page
            .subblock(HALF_PAGE_SIZE, HALF_PAGE_SIZE)
            .ok_or_else(invalid)?;
        let expected = [lower.crc32(), upper.crc32()];

        let start = Command::program_start(lower.address(), expected[0], expected[1]);
        self.checked_exchange(&start, address, ProgramStage::Start)?;
        self.checked_exchange(&Command::raw(&lower)?, address, ProgramStage::LowerHalf)?;
        let status =
            self.checked_exchange(&Command::raw(&upper)?, address, ProgramStage::UpperHalf)?;

        if self.options.verify_crc_echo {
            let actual = [status.crc32_lower, status.crc32_upper];
            if actual != expected {
                return Err(Error::CrcMismatch {
                    address,
                    expected,
                    actual,
                });
            }
        }

        debug!("Page programmed");
        Ok(status)
    }

    /// Reset the bootloader.
    ///
    /// The command is fired several times without waiting since the device may reboot halfway,
    /// then any stale status reports are drained and discarded.
    #[instrument(skip(self))]
    pub fn reset(&self) -> Result<()> {
        let command = Command::reset(self.options.reset_style);
        for attempt in 0..RESET_REPEAT {
            match self.send(&command) {
                Ok(()) => {}
                Err(e) if attempt == 0 => return Err(e),
                Err(e) => {
                    debug!(attempt, error = %e, "Reset write failed, device is rebooting");
                    break;
                }
            }
        }

        for attempt in 0..RESET_DRAIN_ATTEMPTS {
            match self.poll_status(self.options.poll_timeout) {
                Ok(Some(status)) => debug!(attempt, %status, "Discarded stale status"),
                Ok(None) => trace!(attempt, "No status pending"),
                Err(e) => debug!(attempt, error = %e, "Ignoring read error while draining"),
            }
        }

        info!("Bootloader reset");
        Ok(())
    }

    /// Leave the bootloader and start the application at `vector_table`.
    #[instrument(skip(self), fields(vector_table = %format!("0x{:08X}", vector_table)))]
    pub fn exit(&self, vector_table: u32) -> Result<ExitOutcome> {
        self.leave(&Command::exit(vector_table))
    }

    /// Abandon the update and leave the bootloader.
    #[instrument(skip(self))]
    pub fn abort(&self) -> Result<ExitOutcome> {
        self.leave(&Command::abort())
    }

    fn leave(&self, command: &Command) -> Result<ExitOutcome> {
        self.send(command)?;
        let outcome = match self.read_status() {
            Ok(status) => ExitOutcome::RemainedInBootloader(status),
            Err(Error::Transport(e)) if e.is_detach() => ExitOutcome::LeftBootloader,
            Err(e) => return Err(e),
        };

        match &outcome {
            ExitOutcome::LeftBootloader => info!("Device left bootloader"),
            ExitOutcome::RemainedInBootloader(status) => {
                warn!(%status, "Device remained in bootloader")
            }
        }
        Ok(outcome)
    }
}
