//! Intel HEX record parsing.
//!
//! [`HexReader`] walks a line-oriented source and yields one [`Block`] per data record, with
//! extended linear address records folded into the emitted addresses. Parsing stops at the
//! end-of-file record or the first error.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use tracing::{debug, instrument, warn};

use crate::block::Block;
use crate::error::{Error, RecordFault, Result};

/// Every record starts with this character.
const START_CODE: char = ':';

/// Start code, byte count, address, type and checksum.
const RECORD_OVERHEAD: usize = 11;

/// Size of the 32-bit address space.
const ADDRESS_SPACE: u64 = 1 << 32;

/// Record types understood by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Data,
    EndOfFile,
    ExtendedSegmentAddress,
    StartSegmentAddress,
    ExtendedLinearAddress,
    StartLinearAddress,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(RecordType::Data),
            0x01 => Some(RecordType::EndOfFile),
            0x02 => Some(RecordType::ExtendedSegmentAddress),
            0x03 => Some(RecordType::StartSegmentAddress),
            0x04 => Some(RecordType::ExtendedLinearAddress),
            0x05 => Some(RecordType::StartLinearAddress),
            _ => None,
        }
    }
}

/// A single decoded record line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub address: u16,
    pub record_type: u8,
    pub data: Vec<u8>,
    pub checksum: u8,
}

impl Record {
    /// Decode one line (without line terminator).
    ///
    /// `line` is only used for error reporting. Checksum validation is left to the caller.
    pub fn parse(text: &str, line: usize) -> Result<Self> {
        let malformed = |fault| Error::MalformedRecord { line, fault };

        let body = text
            .strip_prefix(START_CODE)
            .ok_or(malformed(RecordFault::InvalidCharacter))?;
        if body.len() < 3 {
            return Err(malformed(RecordFault::ShortLine));
        }

        let count = hex_byte(body, 0).ok_or(malformed(RecordFault::InvalidHexDigit))? as usize;
        let expected = RECORD_OVERHEAD + 2 * count;
        if text.len() != expected {
            return Err(malformed(RecordFault::InvalidLineLength {
                expected,
                actual: text.len(),
            }));
        }

        let bytes = (0..count + 5)
            .map(|i| hex_byte(body, i))
            .collect::<Option<Vec<u8>>>()
            .ok_or(malformed(RecordFault::InvalidHexDigit))?;

        Ok(Self {
            address: u16::from_be_bytes([bytes[1], bytes[2]]),
            record_type: bytes[3],
            data: bytes[4..4 + count].to_vec(),
            checksum: bytes[4 + count],
        })
    }

    /// Checksum the record should carry: two's complement of the sum of all other bytes.
    pub fn expected_checksum(&self) -> u8 {
        let [hi, lo] = self.address.to_be_bytes();
        let sum = [self.data.len() as u8, hi, lo, self.record_type]
            .iter()
            .chain(self.data.iter())
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        sum.wrapping_neg()
    }
}

/// Decode the `index`-th byte of a string of hex digit pairs.
fn hex_byte(text: &str, index: usize) -> Option<u8> {
    let digits = text.get(index * 2..index * 2 + 2)?;
    // from_str_radix alone would also take a leading sign
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

/// Lazy, single-pass iterator of data blocks from a hex image.
pub struct HexReader<R: BufRead> {
    lines: Lines<R>,
    line_number: usize,
    base_address: u32,
    validate_checksums: bool,
    done: bool,
}

impl HexReader<BufReader<File>> {
    /// Open a hex image on disk.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> HexReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            lines: source.lines(),
            line_number: 0,
            base_address: 0,
            validate_checksums: true,
            done: false,
        }
    }

    /// Enable or disable per-record checksum validation (enabled by default).
    pub fn with_checksum_validation(mut self, enabled: bool) -> Self {
        self.validate_checksums = enabled;
        self
    }

    /// Number of lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        loop {
            let Some(text) = self.lines.next() else {
                warn!(
                    lines = self.line_number,
                    "Hex image ended without an end-of-file record"
                );
                return Ok(None);
            };
            let text = text?;
            self.line_number += 1;
            let line = self.line_number;

            let record = Record::parse(text.trim_end(), line)?;

            if self.validate_checksums {
                let expected = record.expected_checksum();
                if record.checksum != expected {
                    return Err(Error::MalformedRecord {
                        line,
                        fault: RecordFault::ChecksumMismatch {
                            expected,
                            actual: record.checksum,
                        },
                    });
                }
            }

            match RecordType::from_u8(record.record_type) {
                Some(RecordType::Data) => {
                    let address = self.base_address | u32::from(record.address);
                    if u64::from(address) + record.data.len() as u64 > ADDRESS_SPACE {
                        return Err(Error::MalformedRecord {
                            line,
                            fault: RecordFault::AddressOverflow,
                        });
                    }
                    return Ok(Some(Block::new(address, record.data)));
                }
                Some(RecordType::EndOfFile) => {
                    debug!(line, "End-of-file record");
                    return Ok(None);
                }
                Some(RecordType::ExtendedLinearAddress) => {
                    let [hi, lo] = record.data[..] else {
                        return Err(Error::MalformedRecord {
                            line,
                            fault: RecordFault::InvalidExtendedAddress,
                        });
                    };
                    self.base_address = u32::from(u16::from_be_bytes([hi, lo])) << 16;
                    debug!(
                        line,
                        base = %format!("0x{:08X}", self.base_address),
                        "Extended linear address"
                    );
                }
                Some(RecordType::StartSegmentAddress) | Some(RecordType::StartLinearAddress) => {
                    debug!(line, record_type = record.record_type, "Ignoring start address");
                }
                Some(RecordType::ExtendedSegmentAddress) | None => {
                    return Err(Error::UnsupportedRecord {
                        line,
                        record_type: record.record_type,
                    });
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for HexReader<R> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_block() {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                // Fuse after an error so nothing past the bad line is emitted
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

/// Read every data block of a hex image, failing on the first bad record.
pub fn read_blocks<R: BufRead>(source: R, validate_checksums: bool) -> Result<Vec<Block>> {
    HexReader::new(source)
        .with_checksum_validation(validate_checksums)
        .collect()
}

/// Read every data block of a hex image on disk.
pub fn read_file<P: AsRef<Path>>(path: P, validate_checksums: bool) -> Result<Vec<Block>> {
    HexReader::open(path)?
        .with_checksum_validation(validate_checksums)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const AA_RECORD: &str = ":10000000AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA50";
    const EOF_RECORD: &str = ":00000001FF";

    fn reader(text: &str) -> HexReader<Cursor<Vec<u8>>> {
        HexReader::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_single_data_record() {
        let text = format!("{AA_RECORD}\n{EOF_RECORD}\n");
        let blocks: Vec<_> = reader(&text).collect::<Result<_>>().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].address(), 0);
        assert_eq!(blocks[0].data(), &[0xAA; 16]);
    }

    #[test]
    fn test_crlf_and_lowercase() {
        let text = ":0400100001020a0bd4\r\n:00000001ff\r\n";
        let blocks: Vec<_> = reader(text).collect::<Result<_>>().unwrap();
        assert_eq!(blocks[0].address(), 0x0010);
        assert_eq!(blocks[0].data(), &[0x01, 0x02, 0x0A, 0x0B]);
    }

    #[test]
    fn test_extended_linear_address() {
        let text = ":020000040800F2\n:0420000001020304D2\n:00000001FF\n";
        let blocks: Vec<_> = reader(text).collect::<Result<_>>().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].address(), 0x0800_2000);
    }

    #[test]
    fn test_start_address_records_ignored() {
        let text = ":0400000300003800C1\n:04000005080020D5FA\n:0100000055AA\n:00000001FF\n";
        let blocks: Vec<_> = reader(text).collect::<Result<_>>().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].data(), &[0x55]);
    }

    #[test]
    fn test_stops_at_eof_record() {
        let text = format!("{EOF_RECORD}\n{AA_RECORD}\n");
        let mut parser = reader(&text);
        assert!(parser.next().is_none());
        assert!(parser.next().is_none());
        assert_eq!(parser.line_number(), 1);
    }

    #[test]
    fn test_missing_eof_ends_cleanly() {
        let blocks: Vec<_> = reader(AA_RECORD).collect::<Result<_>>().unwrap();
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_invalid_character_reports_line() {
        let text = format!("{AA_RECORD}\n{AA_RECORD}\nX0000001FF\n{AA_RECORD}\n");
        let mut parser = reader(&text);
        assert!(parser.next().unwrap().is_ok());
        assert!(parser.next().unwrap().is_ok());
        match parser.next() {
            Some(Err(Error::MalformedRecord { line, fault })) => {
                assert_eq!(line, 3);
                assert_eq!(fault, RecordFault::InvalidCharacter);
            }
            other => panic!("unexpected: {other:?}"),
        }
        // Nothing after the bad line
        assert!(parser.next().is_none());
    }

    #[test]
    fn test_short_line() {
        match reader(":00\n").next() {
            Some(Err(Error::MalformedRecord { line: 1, fault })) => {
                assert_eq!(fault, RecordFault::ShortLine)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_line_length() {
        match reader(":10000000AAAA50\n").next() {
            Some(Err(Error::MalformedRecord { fault, .. })) => assert_eq!(
                fault,
                RecordFault::InvalidLineLength {
                    expected: 43,
                    actual: 15
                }
            ),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_hex_digit() {
        match reader(":0100000G55AA\n").next() {
            Some(Err(Error::MalformedRecord { fault, .. })) => {
                assert_eq!(fault, RecordFault::InvalidHexDigit)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_sign_is_not_a_hex_digit() {
        // Length and checksum line up, only the sign is wrong
        match reader(":01000000+5FA\n").next() {
            Some(Err(Error::MalformedRecord { line: 1, fault })) => {
                assert_eq!(fault, RecordFault::InvalidHexDigit)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_data_past_address_space_rejected() {
        let text = ":02000004FFFFFC\n:10FFF80000000000000000000000000000000000F9\n:00000001FF\n";
        let mut parser = reader(text);
        match parser.next() {
            Some(Err(Error::MalformedRecord { line: 2, fault })) => {
                assert_eq!(fault, RecordFault::AddressOverflow)
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parser.next().is_none());

        let text = ":02000004FFFFFC\n:08FFF800000000000000000001\n:00000001FF\n";
        let blocks: Vec<_> = reader(text).collect::<Result<_>>().unwrap();
        assert_eq!(blocks[0].address(), 0xFFFF_FFF8);
        assert_eq!(blocks[0].end_address(), 1 << 32);
    }

    #[test]
    fn test_checksum_validation() {
        let bad = ":0100000055AB\n:00000001FF\n";
        match reader(bad).next() {
            Some(Err(Error::MalformedRecord { line: 1, fault })) => assert_eq!(
                fault,
                RecordFault::ChecksumMismatch {
                    expected: 0xAA,
                    actual: 0xAB
                }
            ),
            other => panic!("unexpected: {other:?}"),
        }

        let blocks: Vec<_> = reader(bad)
            .with_checksum_validation(false)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(blocks[0].data(), &[0x55]);
    }

    #[test]
    fn test_extended_segment_address_unsupported() {
        match reader(":020000021000EC\n").next() {
            Some(Err(Error::UnsupportedRecord {
                line: 1,
                record_type: 2,
            })) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_record_type_unsupported() {
        match reader(":00000007F9\n").next() {
            Some(Err(Error::UnsupportedRecord { record_type: 7, .. })) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_read_blocks_rejects_whole_image() {
        let text = format!("{AA_RECORD}\n:zz\n");
        assert!(read_blocks(Cursor::new(text), true).is_err());
    }
}
