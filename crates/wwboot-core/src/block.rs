//! Address-tagged firmware data.

use std::fmt;

use crc::{CRC_32_ISO_HDLC, Crc};

/// CRC-32 with the IEEE 802.3 polynomial, as computed by the bootloader.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the checksum the bootloader expects for a run of bytes.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// A contiguous run of firmware bytes starting at `address`.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    address: u32,
    data: Vec<u8>,
}

impl Block {
    pub fn new(address: u32, data: Vec<u8>) -> Self {
        Self { address, data }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One past the last covered address.
    ///
    /// Widened to `u64` so a block ending at the top of the 32-bit space does not wrap.
    pub fn end_address(&self) -> u64 {
        u64::from(self.address) + self.data.len() as u64
    }

    /// Copy out `len` bytes starting at `offset`, keeping their original address.
    ///
    /// Returns `None` if the range does not lie within this block.
    pub fn subblock(&self, offset: usize, len: usize) -> Option<Block> {
        let end = offset.checked_add(len)?;
        let data = self.data.get(offset..end)?;
        Some(Block {
            address: self.address.wrapping_add(offset as u32),
            data: data.to_vec(),
        })
    }

    pub fn crc32(&self) -> u32 {
        crc32(&self.data)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block(0x{:08X}, {} bytes)", self.address, self.data.len())
    }
}
