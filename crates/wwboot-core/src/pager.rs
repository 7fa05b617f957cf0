//! Re-tiling of firmware blocks into flash pages.
//!
//! Input blocks are sorted and merged into maximal contiguous segments, then cut into
//! page-aligned windows of `page_size` bytes. Bytes not covered by any block are zero.

use std::collections::VecDeque;

use tracing::debug;

use crate::block::Block;
use crate::error::{Error, Result};

/// Contiguous run of bytes assembled from adjacent blocks.
#[derive(Debug)]
struct Segment {
    address: u64,
    data: Vec<u8>,
    /// Bytes already emitted into earlier pages.
    consumed: usize,
}

impl Segment {
    fn from_block(block: Block) -> Self {
        Self {
            address: u64::from(block.address()),
            data: block.into_data(),
            consumed: 0,
        }
    }

    fn end_address(&self) -> u64 {
        self.address + self.data.len() as u64
    }

    fn remaining(&self) -> &[u8] {
        &self.data[self.consumed..]
    }

    /// Address of the first byte not yet emitted.
    fn cursor(&self) -> u64 {
        self.address + self.consumed as u64
    }
}

/// Lazy iterator of page-aligned, page-sized blocks.
#[derive(Debug)]
pub struct BlockPager {
    segments: VecDeque<Segment>,
    page_size: usize,
}

impl BlockPager {
    /// Prepare pagination of `blocks` into pages of `page_size` bytes.
    ///
    /// `page_size` must be a non-zero power of two and every block must end within the 32-bit
    /// address space. Overlapping input is not detected here; run [`ensure_disjoint`] first when
    /// the source is untrusted.
    pub fn new(blocks: Vec<Block>, page_size: usize) -> Result<Self> {
        if !page_size.is_power_of_two() {
            return Err(Error::InvalidPageSize(page_size));
        }
        if let Some(block) = blocks.iter().find(|b| b.end_address() > 1 << 32) {
            return Err(Error::AddressOverflow {
                address: block.address(),
                len: block.len(),
            });
        }
        let segments = merge(blocks);
        debug!(segments = segments.len(), page_size, "Merged blocks");
        Ok(Self {
            segments,
            page_size,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

/// Sort blocks and join every run whose end address equals the next block's start address.
fn merge(mut blocks: Vec<Block>) -> VecDeque<Segment> {
    blocks.retain(|b| !b.is_empty());
    blocks.sort_unstable_by_key(Block::address);

    let mut segments: VecDeque<Segment> = VecDeque::new();
    for block in blocks {
        match segments.back_mut() {
            Some(segment) if segment.end_address() == u64::from(block.address()) => {
                segment.data.extend_from_slice(block.data());
            }
            _ => segments.push_back(Segment::from_block(block)),
        }
    }
    segments
}

impl Iterator for BlockPager {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let page_size = self.page_size as u64;
        let mask = page_size - 1;
        let page_start = self.segments.front()?.cursor() & !mask;
        let page_end = page_start + page_size;

        let mut data = vec![0u8; self.page_size];
        while let Some(segment) = self.segments.front_mut() {
            let start = segment.cursor();
            if start >= page_end {
                break;
            }
            let offset = (start - page_start) as usize;
            let take = (self.page_size - offset).min(segment.remaining().len());
            data[offset..offset + take].copy_from_slice(&segment.remaining()[..take]);

            if take == segment.remaining().len() {
                self.segments.pop_front();
            } else {
                // Remainder continues in the next window
                segment.consumed += take;
                break;
            }
        }

        Some(Block::new(page_start as u32, data))
    }
}

/// Paginate `blocks` in one go.
pub fn paginate(blocks: Vec<Block>, page_size: usize) -> Result<Vec<Block>> {
    Ok(BlockPager::new(blocks, page_size)?.collect())
}

/// Reject input where two blocks claim the same address.
pub fn ensure_disjoint(blocks: &[Block]) -> Result<()> {
    let mut ranges: Vec<(u64, u64)> = blocks
        .iter()
        .filter(|b| !b.is_empty())
        .map(|b| (u64::from(b.address()), b.end_address()))
        .collect();
    ranges.sort_unstable();

    for pair in ranges.windows(2) {
        let (_, prev_end) = pair[0];
        let (next_start, _) = pair[1];
        if next_start < prev_end {
            return Err(Error::OverlappingBlocks {
                address: next_start as u32,
            });
        }
    }
    Ok(())
}
