//! wwboot-core: host side of the LED wristwatch USB bootloader.
//!
//! Reads Intel HEX firmware images, cuts them into the 128-byte pages the bootloader writes, and
//! drives the bootloader's 64-byte HID report protocol to program them.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Hex / Block / Pager**: image parsing and page layout, no I/O besides reading the file
//! - **Protocol**: constants, command reports, status reports
//! - **Transport**: HID report abstraction (nusb, mock)
//! - **Session**: bootloader and application request/response drivers
//! - **Events**: observer pattern for UI decoupling
//! - **Flasher**: high-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use wwboot_core::{DeviceKind, FlashConfig, Flasher, NusbTransport};
//!
//! # fn main() -> anyhow::Result<()> {
//! let flasher = Flasher::new(FlashConfig::default());
//! let pages = flasher.load_image("watch.hex")?;
//! let transport = NusbTransport::open(DeviceKind::Bootloader)?;
//! flasher.flash(transport, &pages)?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod block;
pub mod device;
pub mod error;
pub mod events;
pub mod flasher;
pub mod hex;
pub mod pager;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use application::ApplicationSession;
pub use block::{Block, crc32};
pub use device::{DeviceEntry, DeviceKind, find_device};
pub use error::{Error, RecordFault, Result};
pub use events::{FlashEvent, FlashObserver, FlashPhase, NullObserver, TracingObserver};
pub use flasher::{FlashConfig, FlashReport, Flasher};
pub use hex::HexReader;
pub use pager::{BlockPager, paginate};
pub use protocol::{Command, ErrorFlags, ResetStyle, Status, WatchTime};
pub use session::{BootloaderSession, ExitOutcome, ProgramStage, SessionOptions};
pub use transport::{HidTransport, MockTransport, NusbTransport, ReportFraming, TransportError};
