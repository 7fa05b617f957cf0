//! Protocol module - bootloader command and status reports.

pub mod command;
pub mod constants;
pub mod status;

pub use command::{Command, ResetStyle, WatchTime};
pub use constants::*;
pub use status::{ErrorFlags, Status};
