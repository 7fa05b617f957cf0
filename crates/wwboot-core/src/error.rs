//! Error taxonomy for image parsing, pagination and the bootloader protocol.

use std::fmt;

use thiserror::Error;

use crate::protocol::ErrorFlags;
use crate::session::ProgramStage;
use crate::transport::TransportError;

/// Every failure the core can report.
///
/// The set is closed so callers can match exhaustively and decide per kind whether to retry a
/// page, reject an image or give up on the device.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed record at line {line}: {fault}")]
    MalformedRecord { line: usize, fault: RecordFault },

    #[error("Unsupported record type 0x{record_type:02X} at line {line}")]
    UnsupportedRecord { line: usize, record_type: u8 },

    #[error("Invalid page block at 0x{address:08X} ({len} bytes)")]
    InvalidPageBlock { address: u32, len: usize },

    #[error("Bootloader rejected {stage} for page 0x{address:08X}: {flags}")]
    BootloaderProtocol {
        address: u32,
        stage: ProgramStage,
        flags: ErrorFlags,
    },

    #[error(
        "CRC mismatch for page 0x{address:08X}: expected {expected:08X?}, device reported {actual:08X?}"
    )]
    CrcMismatch {
        address: u32,
        expected: [u32; 2],
        actual: [u32; 2],
    },

    #[error("Short report: expected {expected} bytes, got {actual}")]
    ShortReport { expected: usize, actual: usize },

    #[error("Command payload too long: {len} bytes")]
    PayloadTooLong { len: usize },

    #[error("Unsupported page size {0}")]
    InvalidPageSize(usize),

    #[error("Block at 0x{address:08X} ({len} bytes) runs past the 32-bit address space")]
    AddressOverflow { address: u32, len: usize },

    #[error("Overlapping firmware data at 0x{address:08X}")]
    OverlappingBlocks { address: u32 },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a hex record line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFault {
    InvalidCharacter,
    ShortLine,
    InvalidLineLength { expected: usize, actual: usize },
    InvalidHexDigit,
    ChecksumMismatch { expected: u8, actual: u8 },
    InvalidExtendedAddress,
    AddressOverflow,
}

impl fmt::Display for RecordFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordFault::InvalidCharacter => write!(f, "invalid character"),
            RecordFault::ShortLine => write!(f, "short line"),
            RecordFault::InvalidLineLength { expected, actual } => {
                write!(f, "invalid line length (expected {expected}, got {actual})")
            }
            RecordFault::InvalidHexDigit => write!(f, "invalid hex digit"),
            RecordFault::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch (expected 0x{expected:02X}, got 0x{actual:02X})"
            ),
            RecordFault::InvalidExtendedAddress => write!(f, "invalid extended linear address"),
            RecordFault::AddressOverflow => write!(f, "data runs past the 32-bit address space"),
        }
    }
}

/// Shorthand for results carrying the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Page address for errors scoped to a single page exchange.
    pub fn page_address(&self) -> Option<u32> {
        match self {
            Error::InvalidPageBlock { address, .. }
            | Error::BootloaderProtocol { address, .. }
            | Error::CrcMismatch { address, .. } => Some(*address),
            _ => None,
        }
    }

    /// Whether the failed page may be retried from program-start.
    pub fn is_page_retryable(&self) -> bool {
        matches!(
            self,
            Error::BootloaderProtocol { .. } | Error::CrcMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_record_message() {
        let err = Error::MalformedRecord {
            line: 7,
            fault: RecordFault::ShortLine,
        };
        assert_eq!(err.to_string(), "Malformed record at line 7: short line");
    }

    #[test]
    fn test_protocol_error_is_retryable() {
        let err = Error::BootloaderProtocol {
            address: 0x0800_2000,
            stage: ProgramStage::Start,
            flags: ErrorFlags::INVALID_CRC32,
        };
        assert!(err.is_page_retryable());
        assert_eq!(err.page_address(), Some(0x0800_2000));

        let err = Error::UnsupportedRecord {
            line: 1,
            record_type: 2,
        };
        assert!(!err.is_page_retryable());
        assert_eq!(err.page_address(), None);
    }
}
