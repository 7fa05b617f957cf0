//! Image flasher - high-level orchestrator for a firmware update.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::block::Block;
use crate::error::{Error, Result};
use crate::events::{FlashEvent, FlashObserver, FlashPhase, PacketDirection, TracingObserver};
use crate::hex;
use crate::pager::{ensure_disjoint, paginate};
use crate::protocol::ResetStyle;
use crate::protocol::constants::*;
use crate::session::{BootloaderSession, ExitOutcome, SessionOptions};
use crate::transport::{HidTransport, TransportError};

/// Configuration for a flashing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashConfig {
    /// Path to the Intel HEX image.
    pub image_path: Option<String>,
    /// Page size in bytes. The bootloader only accepts 128.
    pub page_size: usize,
    /// Reset the bootloader before the first page.
    pub reset_before: bool,
    pub reset_style: ResetStyle,
    /// Start the application once every page is written.
    pub exit_after: bool,
    /// Vector table handed to the exit command.
    pub vector_table: u32,
    /// Timeout for polling reads in milliseconds.
    pub poll_timeout_ms: u64,
    /// Require the bootloader to echo each page's CRC32s.
    pub verify_crc_echo: bool,
    /// Reject hex records whose checksum doesn't match.
    pub validate_checksums: bool,
    /// Extra attempts per page after a protocol error.
    pub page_retries: u32,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            image_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            reset_before: true,
            reset_style: ResetStyle::default(),
            exit_after: true,
            vector_table: APPLICATION_BASE,
            poll_timeout_ms: STATUS_POLL_TIMEOUT_MS,
            verify_crc_echo: false,
            validate_checksums: true,
            page_retries: 0,
        }
    }
}

impl FlashConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FlashConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            reset_style: self.reset_style,
            verify_crc_echo: self.verify_crc_echo,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashReport {
    pub pages: usize,
    /// Page attempts that failed and were retried.
    pub retries: u32,
    /// `None` when exit was not requested.
    pub exit: Option<ExitOutcome>,
}

/// Drives a complete update: load, page, reset, program, exit.
pub struct Flasher<O: FlashObserver> {
    config: FlashConfig,
    observer: Arc<O>,
}

impl Flasher<TracingObserver> {
    /// Create a flasher with the default tracing observer.
    pub fn new(config: FlashConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: FlashObserver> Flasher<O> {
    pub fn with_observer(config: FlashConfig, observer: Arc<O>) -> Self {
        Self { config, observer }
    }

    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    fn change_phase(&self, phase: &mut FlashPhase, to: FlashPhase) {
        self.observer.on_event(&FlashEvent::PhaseChanged { from: *phase, to });
        *phase = to;
    }

    /// Turn parsed blocks into the pages that will be written.
    pub fn pages_from_blocks(&self, blocks: Vec<Block>) -> Result<Vec<Block>> {
        if self.config.page_size != PAGE_SIZE {
            return Err(Error::InvalidPageSize(self.config.page_size));
        }
        ensure_disjoint(&blocks)?;
        paginate(blocks, self.config.page_size)
    }

    /// Parse a whole image and page it. Nothing touches the device here.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn load_image<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Block>> {
        let blocks = hex::read_file(path, self.config.validate_checksums)?;
        let pages = self.pages_from_blocks(blocks)?;
        info!(pages = pages.len(), "Image loaded");
        Ok(pages)
    }

    /// Write `pages` to the bootloader behind `transport`.
    #[instrument(skip(self, transport, pages), fields(pages = pages.len()))]
    pub fn flash<T: HidTransport>(&self, transport: T, pages: &[Block]) -> Result<FlashReport> {
        self.observer.on_event(&FlashEvent::DeviceConnected {
            vid: transport.vendor_id(),
            pid: transport.product_id(),
        });

        let obs_transport = ObservableTransport {
            inner: &transport,
            observer: &self.observer,
        };
        let session = BootloaderSession::with_options(obs_transport, self.config.session_options());

        let mut phase = FlashPhase::Loading;
        let result = self.run_session(&session, pages, &mut phase);
        if let Err(e) = &result {
            self.change_phase(&mut phase, FlashPhase::Error);
            warn!(error = %e, "Update failed");
        }
        result
    }

    fn run_session<T: HidTransport>(
        &self,
        session: &BootloaderSession<T>,
        pages: &[Block],
        phase: &mut FlashPhase,
    ) -> Result<FlashReport> {
        if self.config.reset_before {
            self.change_phase(phase, FlashPhase::Reset);
            session.reset()?;
        }

        self.change_phase(phase, FlashPhase::Programming);
        if pages.is_empty() {
            warn!("Image contains no data");
        }

        let total = pages.len() as u64;
        let mut retries = 0;
        for (index, page) in pages.iter().enumerate() {
            retries += self.program_with_retries(session, page)?;
            self.observer.on_event(&FlashEvent::Progress {
                current: index as u64 + 1,
                total,
            });
        }

        let exit = if self.config.exit_after {
            self.change_phase(phase, FlashPhase::Exit);
            let outcome = session.exit(self.config.vector_table)?;
            if outcome.left() {
                self.observer.on_event(&FlashEvent::DeviceDisconnected);
            }
            Some(outcome)
        } else {
            None
        };

        self.change_phase(phase, FlashPhase::Complete);
        self.observer.on_event(&FlashEvent::Complete);

        Ok(FlashReport {
            pages: pages.len(),
            retries,
            exit,
        })
    }

    /// Program one page, returning the number of failed attempts that were retried.
    fn program_with_retries<T: HidTransport>(
        &self,
        session: &BootloaderSession<T>,
        page: &Block,
    ) -> Result<u32> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match session.program_page(page) {
                Ok(_) => {
                    self.observer.on_event(&FlashEvent::PageProgrammed {
                        address: page.address(),
                        attempt,
                    });
                    return Ok(attempt - 1);
                }
                Err(e) => {
                    self.observer.on_event(&FlashEvent::PageFailed {
                        address: page.address(),
                        attempt,
                        message: e.to_string(),
                    });
                    if !e.is_page_retryable() || attempt > self.config.page_retries {
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// Transport wrapper that emits packet events.
struct ObservableTransport<'a, T: HidTransport, O: FlashObserver> {
    inner: &'a T,
    observer: &'a Arc<O>,
}

impl<T: HidTransport, O: FlashObserver> ObservableTransport<'_, T, O> {
    fn emit(&self, direction: PacketDirection, data: &[u8]) {
        self.observer.on_event(&FlashEvent::Packet {
            direction,
            length: data.len(),
            data: Some(data.iter().take(16).cloned().collect()),
        });
    }
}

impl<T: HidTransport, O: FlashObserver> HidTransport for ObservableTransport<'_, T, O> {
    fn write(&self, data: &[u8]) -> std::result::Result<usize, TransportError> {
        let res = self.inner.write(data);
        if res.is_ok() {
            self.emit(PacketDirection::Tx, data);
        }
        res
    }

    fn read(&self, max_len: usize) -> std::result::Result<Vec<u8>, TransportError> {
        let res = self.inner.read(max_len);
        if let Ok(data) = &res {
            self.emit(PacketDirection::Rx, data);
        }
        res
    }

    fn read_timeout(
        &self,
        max_len: usize,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let res = self.inner.read_timeout(max_len, timeout);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.emit(PacketDirection::Rx, data);
        }
        res
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn vendor_id(&self) -> u16 {
        self.inner.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.inner.product_id()
    }
}
