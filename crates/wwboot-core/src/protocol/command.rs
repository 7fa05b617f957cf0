//! Outbound command reports.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::constants::*;
use crate::block::Block;
use crate::error::{Error, Result};

/// How the reset command is encoded; differs between bootloader generations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetStyle {
    /// `0xFFFFFFFF` followed by an all-`0xFF` payload.
    #[default]
    Erased,
    /// `0x00000000` with an empty payload (first generation bootloader).
    Zeroed,
}

/// Wall-clock time as the watch stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTime {
    /// Two-digit year (`0..=99`).
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl WatchTime {
    fn to_bytes(self) -> [u8; 6] {
        [
            self.year % 100,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        ]
    }
}

impl std::fmt::Display for WatchTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year % 100,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second
        )
    }
}

/// One 64-byte command: a little-endian code followed by a zero-padded 60 byte payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    code: u32,
    payload: [u8; PAYLOAD_SIZE],
}

impl Command {
    /// Build a command from a code and up to 60 bytes of payload.
    pub fn new(code: u32, payload: &[u8]) -> Result<Self> {
        if payload.len() > PAYLOAD_SIZE {
            return Err(Error::PayloadTooLong { len: payload.len() });
        }
        let mut padded = [0u8; PAYLOAD_SIZE];
        padded[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            code,
            payload: padded,
        })
    }

    fn with_words(code: u32, words: &[u32]) -> Self {
        let mut payload = [0u8; PAYLOAD_SIZE];
        for (chunk, &word) in payload.chunks_exact_mut(4).zip(words) {
            LittleEndian::write_u32(chunk, word);
        }
        Self { code, payload }
    }

    pub fn reset(style: ResetStyle) -> Self {
        match style {
            ResetStyle::Erased => Self {
                code: CMD_RESET,
                payload: [0xFF; PAYLOAD_SIZE],
            },
            ResetStyle::Zeroed => Self::with_words(CMD_RESET_LEGACY, &[]),
        }
    }

    /// Announce a page: address of its lower half and the CRC32 of both halves.
    pub fn program_start(address: u32, crc32_lower: u32, crc32_upper: u32) -> Self {
        Self::with_words(CMD_PROGRAM, &[address, crc32_lower, crc32_upper])
    }

    /// Leave the bootloader and start the application whose vector table is at `vector_table`.
    pub fn exit(vector_table: u32) -> Self {
        Self::with_words(CMD_EXIT, &[vector_table])
    }

    pub fn abort() -> Self {
        Self::with_words(CMD_ABORT, &[])
    }

    pub fn set_time(time: WatchTime) -> Self {
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload[..6].copy_from_slice(&time.to_bytes());
        Self {
            code: CMD_SET_TIME,
            payload,
        }
    }

    pub fn enter_bootloader() -> Self {
        Self::with_words(CMD_ENTER_BOOTLOADER, &[])
    }

    /// Send a half page verbatim: its first four bytes take the place of the code.
    pub fn raw(half: &Block) -> Result<Self> {
        if half.len() != REPORT_SIZE {
            return Err(Error::InvalidPageBlock {
                address: half.address(),
                len: half.len(),
            });
        }
        let data = half.data();
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&data[COMMAND_CODE_SIZE..]);
        Ok(Self {
            code: LittleEndian::read_u32(&data[..COMMAND_CODE_SIZE]),
            payload,
        })
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn payload(&self) -> &[u8; PAYLOAD_SIZE] {
        &self.payload
    }

    pub fn to_bytes(&self) -> [u8; REPORT_SIZE] {
        let mut report = [0u8; REPORT_SIZE];
        LittleEndian::write_u32(&mut report[..COMMAND_CODE_SIZE], self.code);
        report[COMMAND_CODE_SIZE..].copy_from_slice(&self.payload);
        report
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Command(0x{:08X})", self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_padded() {
        let cmd = Command::new(0x1234_5678, &[1, 2, 3]).unwrap();
        let bytes = cmd.to_bytes();
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[..4], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(&bytes[4..7], &[1, 2, 3]);
        assert!(bytes[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_payload_too_long() {
        assert!(matches!(
            Command::new(0, &[0u8; 61]),
            Err(Error::PayloadTooLong { len: 61 })
        ));
        assert!(Command::new(0, &[0u8; 60]).is_ok());
    }

    #[test]
    fn test_program_start_layout() {
        let bytes = Command::program_start(0x0800_2000, 0xDEAD_BEEF, 0x0102_0304).to_bytes();
        assert_eq!(&bytes[0..4], &CMD_PROGRAM.to_le_bytes());
        assert_eq!(&bytes[4..8], &0x0800_2000u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(&bytes[12..16], &0x0102_0304u32.to_le_bytes());
        assert!(bytes[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_reset_styles() {
        assert_eq!(Command::reset(ResetStyle::Erased).to_bytes(), [0xFF; 64]);
        assert_eq!(Command::reset(ResetStyle::Zeroed).to_bytes(), [0x00; 64]);
    }

    #[test]
    fn test_exit_and_abort() {
        let exit = Command::exit(APPLICATION_BASE).to_bytes();
        assert_eq!(&exit[0..4], &[0xC3, 0, 0, 0]);
        assert_eq!(&exit[4..8], &APPLICATION_BASE.to_le_bytes());

        let abort = Command::abort().to_bytes();
        assert_eq!(&abort[0..4], &[0x3E, 0, 0, 0]);
        assert!(abort[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_set_time_payload() {
        let time = WatchTime {
            year: 124,
            month: 3,
            day: 9,
            hour: 23,
            minute: 59,
            second: 1,
        };
        let bytes = Command::set_time(time).to_bytes();
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..10], &[24, 3, 9, 23, 59, 1]);
        assert_eq!(Command::enter_bootloader().code(), CMD_ENTER_BOOTLOADER);
    }

    #[test]
    fn test_raw_half_passthrough() {
        let data: Vec<u8> = (0..64).collect();
        let half = Block::new(0x0800_2000, data.clone());
        let cmd = Command::raw(&half).unwrap();
        assert_eq!(cmd.to_bytes().to_vec(), data);
    }

    #[test]
    fn test_raw_rejects_wrong_length() {
        let half = Block::new(0x0800_2000, vec![0; 63]);
        assert!(matches!(
            Command::raw(&half),
            Err(Error::InvalidPageBlock {
                address: 0x0800_2000,
                len: 63
            })
        ));
    }
}
