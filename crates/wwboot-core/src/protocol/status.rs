//! Status report decoding.
//!
//! Every command sent to the bootloader is answered with one 64-byte status report:
//!
//! | Offset | Field          |
//! |--------|----------------|
//! | 0..4   | last command   |
//! | 4..8   | error flags    |
//! | 8..12  | CRC32 of lower |
//! | 12..16 | CRC32 of upper |
//! | 16..64 | reserved       |

use std::fmt;
use std::io::Cursor;

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt};

use super::constants::*;
use crate::error::{Error, Result};

bitflags! {
    /// Error bits reported by the bootloader.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ErrorFlags: u32 {
        const INTERNAL = STATUS_ERR_INTERNAL;
        const INVALID_COMMAND = STATUS_ERR_COMMAND;
        const INVALID_ADDRESS = STATUS_ERR_ADDRESS;
        const INVALID_CRC32 = STATUS_ERR_CRC32;
        const WRITE_FAILED = STATUS_ERR_WRITE;
        const SHORT_REPORT = STATUS_ERR_SHORT_REPORT;
    }
}

const FLAG_MESSAGES: [(ErrorFlags, &str); 6] = [
    (ErrorFlags::INTERNAL, "Internal Error"),
    (ErrorFlags::INVALID_COMMAND, "Invalid Command"),
    (ErrorFlags::INVALID_ADDRESS, "Invalid Address"),
    (ErrorFlags::INVALID_CRC32, "Invalid CRC32"),
    (ErrorFlags::WRITE_FAILED, "Write Failed"),
    (ErrorFlags::SHORT_REPORT, "Short Output Report Length"),
];

impl ErrorFlags {
    /// Human readable names of all set bits, in bit order.
    pub fn messages(&self) -> Vec<String> {
        let mut messages: Vec<String> = FLAG_MESSAGES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, msg)| (*msg).to_string())
            .collect();
        let unknown = self.bits() & !Self::all().bits();
        if unknown != 0 {
            messages.push(format!("Unknown Flags 0x{unknown:08X}"));
        }
        messages
    }
}

impl fmt::Display for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No Error");
        }
        write!(f, "{}", self.messages().join(", "))
    }
}

/// Decoded status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub last_command: u32,
    pub flags: ErrorFlags,
    pub crc32_lower: u32,
    pub crc32_upper: u32,
}

impl Status {
    pub const SIZE: usize = REPORT_SIZE;

    /// Decode a report. Bytes past the fixed fields are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::ShortReport {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            last_command: cursor.read_u32::<LittleEndian>()?,
            flags: ErrorFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?),
            crc32_lower: cursor.read_u32::<LittleEndian>()?,
            crc32_upper: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Encode as the device would, with zeroed reserved bytes.
    pub fn to_bytes(&self) -> [u8; REPORT_SIZE] {
        let mut report = [0u8; REPORT_SIZE];
        let fields = [
            self.last_command,
            self.flags.bits(),
            self.crc32_lower,
            self.crc32_upper,
        ];
        for (chunk, value) in report.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        report
    }

    /// A status with no error bits set.
    pub fn ok(last_command: u32) -> Self {
        Self {
            last_command,
            flags: ErrorFlags::empty(),
            crc32_lower: 0,
            crc32_upper: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.flags.is_empty()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "last command 0x{:08X}, {}, CRC32 {:08X}/{:08X}",
            self.last_command, self.flags, self.crc32_lower, self.crc32_upper
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fields() {
        let mut report = [0xEEu8; REPORT_SIZE];
        report[0..4].copy_from_slice(&CMD_PROGRAM.to_le_bytes());
        report[4..8].copy_from_slice(&0u32.to_le_bytes());
        report[8..12].copy_from_slice(&0x1122_3344u32.to_le_bytes());
        report[12..16].copy_from_slice(&0xAABB_CCDDu32.to_le_bytes());

        let status = Status::from_bytes(&report).unwrap();
        assert_eq!(status.last_command, CMD_PROGRAM);
        assert!(status.is_ok());
        assert_eq!(status.crc32_lower, 0x1122_3344);
        assert_eq!(status.crc32_upper, 0xAABB_CCDD);
    }

    #[test]
    fn test_combined_flags_message() {
        let mut report = [0u8; REPORT_SIZE];
        report[4] = 0x0A;
        let status = Status::from_bytes(&report).unwrap();
        assert_eq!(
            status.flags,
            ErrorFlags::INVALID_COMMAND | ErrorFlags::INVALID_CRC32
        );
        assert_eq!(status.flags.to_string(), "Invalid Command, Invalid CRC32");
    }

    #[test]
    fn test_every_flag_named() {
        let all = ErrorFlags::from_bits_retain(0x3F);
        assert_eq!(all.messages().len(), 6);
        assert_eq!(
            all.to_string(),
            "Internal Error, Invalid Command, Invalid Address, Invalid CRC32, \
             Write Failed, Short Output Report Length"
        );
    }

    #[test]
    fn test_unknown_flags_retained() {
        let flags = ErrorFlags::from_bits_retain(0x104);
        assert_eq!(flags.bits(), 0x104);
        assert_eq!(
            flags.to_string(),
            "Invalid Address, Unknown Flags 0x00000100"
        );
    }

    #[test]
    fn test_short_report_rejected() {
        assert!(matches!(
            Status::from_bytes(&[0u8; 16]),
            Err(Error::ShortReport {
                expected: 64,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_encode_matches_decode() {
        let status = Status {
            last_command: CMD_EXIT,
            flags: ErrorFlags::WRITE_FAILED,
            crc32_lower: 1,
            crc32_upper: 2,
        };
        assert_eq!(Status::from_bytes(&status.to_bytes()).unwrap(), status);
    }
}
