//! Mapping between logical byte ranges and fixed-size blocks.
//!
//! [`BlockCodec`] is the pure arithmetic for files whose non-final blocks are all
//! exactly `block_size` bytes. Forced-block writes and append continuation can
//! leave short blocks in the middle of a file, so descriptors carry a
//! [`BlockLayout`], which uses the codec when it can and falls back to a table of
//! block end offsets when it cannot.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// One block's share of a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Block index.
    pub index: u32,
    /// Offset of the first covered byte inside the block.
    pub start: usize,
    /// Number of covered bytes inside the block.
    pub len: usize,
}

/// Block arithmetic for a fixed `block_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCodec {
    block_size: usize,
}

impl BlockCodec {
    /// Create a codec. `block_size` must be non-zero.
    pub fn new(block_size: usize) -> StoreResult<Self> {
        if block_size == 0 {
            return Err(StoreError::InvalidConfig("block_size must be > 0".into()));
        }
        if u32::try_from(block_size).is_err() {
            return Err(StoreError::InvalidConfig(format!(
                "block_size too large: {block_size}"
            )));
        }
        Ok(Self { block_size })
    }

    /// Configured block size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn bs(&self) -> u64 {
        self.block_size as u64
    }

    /// `ceil(len / block_size)`; zero for an empty file.
    pub fn block_count(&self, len: u64) -> u64 {
        len.div_ceil(self.bs())
    }

    /// Length of the final block of a `len`-byte file (zero iff `len == 0`).
    pub fn last_block_len(&self, len: u64) -> usize {
        if len == 0 {
            return 0;
        }
        (len - (self.block_count(len) - 1) * self.bs()) as usize
    }

    /// `(block index, offset inside block)` for a logical offset.
    pub fn locate(&self, offset: u64) -> (u32, usize) {
        ((offset / self.bs()) as u32, (offset % self.bs()) as usize)
    }

    /// Blocks (and ranges inside them) covering `[offset, offset + len)`, in order.
    pub fn span(&self, offset: u64, len: u64) -> Vec<BlockSpan> {
        let mut out = Vec::new();
        let mut pos = offset;
        let end = offset.saturating_add(len);
        while pos < end {
            let (index, start) = self.locate(pos);
            let take = (self.block_size - start).min((end - pos) as usize);
            out.push(BlockSpan {
                index,
                start,
                len: take,
            });
            pos += take as u64;
        }
        out
    }
}

/// How a file's bytes are laid out across its blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockLayout {
    /// Every block but the last holds exactly `block_size` bytes.
    Uniform {
        /// Block size the file was written with.
        block_size: u32,
        /// Total length in bytes.
        length: u64,
    },
    /// Arbitrary block lengths; `ends[i]` is the exclusive end offset of block `i`.
    Ragged {
        /// Cumulative end offsets, strictly increasing.
        ends: Vec<u64>,
    },
}

impl BlockLayout {
    /// An empty file written with `block_size`.
    pub fn empty(block_size: usize) -> Self {
        BlockLayout::Uniform {
            block_size: block_size as u32,
            length: 0,
        }
    }

    fn codec(block_size: u32) -> BlockCodec {
        BlockCodec {
            block_size: block_size.max(1) as usize,
        }
    }

    /// Total length in bytes.
    pub fn length(&self) -> u64 {
        match self {
            BlockLayout::Uniform { length, .. } => *length,
            BlockLayout::Ragged { ends } => ends.last().copied().unwrap_or(0),
        }
    }

    /// Number of blocks.
    pub fn block_count(&self) -> u32 {
        match self {
            BlockLayout::Uniform { block_size, length } => {
                Self::codec(*block_size).block_count(*length) as u32
            }
            BlockLayout::Ragged { ends } => ends.len() as u32,
        }
    }

    /// Whether every non-final block is full.
    pub fn is_uniform(&self) -> bool {
        matches!(self, BlockLayout::Uniform { .. })
    }

    /// Start offset of block `index`.
    pub fn block_start(&self, index: u32) -> u64 {
        match self {
            BlockLayout::Uniform { block_size, .. } => index as u64 * *block_size as u64,
            BlockLayout::Ragged { ends } => match index {
                0 => 0,
                i => ends[(i - 1) as usize],
            },
        }
    }

    /// Payload length of block `index` (zero past the end).
    pub fn block_len(&self, index: u32) -> usize {
        if index >= self.block_count() {
            return 0;
        }
        match self {
            BlockLayout::Uniform { block_size, length } => {
                let codec = Self::codec(*block_size);
                if index + 1 == self.block_count() {
                    codec.last_block_len(*length)
                } else {
                    codec.block_size()
                }
            }
            BlockLayout::Ragged { ends } => {
                (ends[index as usize] - self.block_start(index)) as usize
            }
        }
    }

    /// `(block index, offset inside block)` for a logical offset.
    ///
    /// Offsets at or past the end map to `(block_count, 0)`.
    pub fn locate(&self, offset: u64) -> (u32, usize) {
        if offset >= self.length() {
            return (self.block_count(), 0);
        }
        match self {
            BlockLayout::Uniform { block_size, .. } => Self::codec(*block_size).locate(offset),
            BlockLayout::Ragged { ends } => {
                let index = ends.partition_point(|&e| e <= offset) as u32;
                (index, (offset - self.block_start(index)) as usize)
            }
        }
    }

    /// Blocks covering `[offset, offset + len)`.
    ///
    /// Fails with `OutOfBounds` if the range extends past the end of the file.
    pub fn span(&self, offset: u64, len: u64) -> StoreResult<Vec<BlockSpan>> {
        let end = offset.checked_add(len);
        if end.is_none_or(|e| e > self.length()) {
            return Err(StoreError::OutOfBounds {
                what: "block range".into(),
                offset,
                length: len,
                limit: self.length(),
            });
        }
        if let BlockLayout::Uniform { block_size, .. } = self {
            return Ok(Self::codec(*block_size).span(offset, len));
        }
        let mut out = Vec::new();
        let mut pos = offset;
        let end = offset + len;
        while pos < end {
            let (index, start) = self.locate(pos);
            let take = (self.block_len(index) - start).min((end - pos) as usize);
            out.push(BlockSpan {
                index,
                start,
                len: take,
            });
            pos += take as u64;
        }
        Ok(out)
    }

    /// Record one more block of `len` bytes at the end of the file.
    ///
    /// Stays uniform while the previous final block was full and `len` fits in
    /// `block_size`; otherwise switches to an explicit end-offset table.
    pub fn push_block(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        match self {
            BlockLayout::Uniform { block_size, length } => {
                let bs = *block_size as u64;
                if *length % bs == 0 && len as u64 <= bs {
                    *length += len as u64;
                    return;
                }
                let mut ends = self.ends();
                let last = ends.last().copied().unwrap_or(0);
                ends.push(last + len as u64);
                *self = BlockLayout::Ragged { ends };
            }
            BlockLayout::Ragged { ends } => {
                let last = ends.last().copied().unwrap_or(0);
                ends.push(last + len as u64);
            }
        }
    }

    /// Cumulative end offsets of every block.
    pub fn ends(&self) -> Vec<u64> {
        match self {
            BlockLayout::Uniform { .. } => (0..self.block_count())
                .map(|i| self.block_start(i) + self.block_len(i) as u64)
                .collect(),
            BlockLayout::Ragged { ends } => ends.clone(),
        }
    }

    /// Check internal consistency (used when decoding untrusted descriptors).
    pub fn validate(&self) -> StoreResult<()> {
        match self {
            BlockLayout::Uniform { block_size, .. } if *block_size == 0 => Err(
                StoreError::Format("uniform layout with zero block size".into()),
            ),
            BlockLayout::Uniform { block_size, length }
                if Self::codec(*block_size).block_count(*length) > u64::from(u32::MAX) =>
            {
                Err(StoreError::Format(format!(
                    "uniform layout needs more than u32::MAX blocks: length={length}"
                )))
            }
            BlockLayout::Ragged { ends } if ends.len() > u32::MAX as usize => Err(
                StoreError::Format("ragged layout has more than u32::MAX blocks".into()),
            ),
            BlockLayout::Ragged { ends } if ends.windows(2).any(|w| w[0] >= w[1]) => Err(
                StoreError::Format("ragged layout ends are not strictly increasing".into()),
            ),
            BlockLayout::Ragged { ends } if ends.first() == Some(&0) => {
                Err(StoreError::Format("ragged layout has an empty block".into()))
            }
            _ => Ok(()),
        }
    }
}
