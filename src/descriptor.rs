//! Per-path metadata record stored in the `DESCRIPTOR` column.
//!
//! ## Public invariants (must not change without a format bump)
//!
//! - **Framing**: `[DESCRIPTOR_MAGIC][FORMAT_VERSION][payload_len:u32][crc32:u32][payload]`
//!   (little-endian for integers).
//! - **Payload**: postcard-encoded [`Descriptor`].
//! - **Checksum**: `crc32fast` over the payload bytes.
//! - `length()` equals the sum of the block payload lengths it describes; the
//!   descriptor is written only after every block it references.

use crate::codec::BlockLayout;
use crate::error::{StoreError, StoreResult};
use crate::formats::{DESCRIPTOR_MAGIC, FORMAT_VERSION};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on descriptor payload size, so a corrupt header cannot make us
/// allocate an absurd buffer.
pub const MAX_DESCRIPTOR_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Whether a path holds bytes or other paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A file made of blocks.
    File,
    /// A container whose children are listed in the descriptor.
    Directory,
}

/// Metadata for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// File or directory.
    pub kind: EntryKind,
    /// Block layout (always empty for directories).
    pub layout: BlockLayout,
    /// Last modification, milliseconds since the Unix epoch.
    pub last_modified_ms: u64,
    /// Bumped on every commit; used to detect racing writers.
    pub generation: u64,
    /// Leaf names of direct children (directories only).
    pub children: BTreeSet<String>,
}

impl Descriptor {
    /// A fresh, empty file descriptor.
    pub fn new_file(block_size: usize) -> Self {
        Self {
            kind: EntryKind::File,
            layout: BlockLayout::empty(block_size),
            last_modified_ms: now_millis(),
            generation: 0,
            children: BTreeSet::new(),
        }
    }

    /// A fresh directory descriptor with no children.
    pub fn new_directory(block_size: usize) -> Self {
        Self {
            kind: EntryKind::Directory,
            ..Self::new_file(block_size)
        }
    }

    /// Total file length in bytes.
    pub fn length(&self) -> u64 {
        self.layout.length()
    }

    /// Number of blocks.
    pub fn block_count(&self) -> u32 {
        self.layout.block_count()
    }

    /// Whether this describes a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Serialize with header and CRC.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let payload =
            postcard::to_allocvec(self).map_err(|e| StoreError::Encode(e.to_string()))?;
        if payload.len() > MAX_DESCRIPTOR_PAYLOAD_BYTES {
            return Err(StoreError::Format(format!(
                "descriptor payload too large: {} bytes (max {})",
                payload.len(),
                MAX_DESCRIPTOR_PAYLOAD_BYTES
            )));
        }
        let h = DescriptorHeader {
            magic: DESCRIPTOR_MAGIC,
            version: FORMAT_VERSION,
            payload_len: payload.len() as u32,
            checksum: crc32fast::hash(&payload),
        };
        let mut buf = Vec::with_capacity(DescriptorHeader::SIZE + payload.len());
        h.write(&mut buf)?;
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Parse and validate a descriptor column value.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let mut r = bytes;
        let h = DescriptorHeader::read(&mut r)?;
        let len = h.payload_len as usize;
        if len > MAX_DESCRIPTOR_PAYLOAD_BYTES {
            return Err(StoreError::Format(format!(
                "descriptor payload too large: {len} bytes (max {MAX_DESCRIPTOR_PAYLOAD_BYTES})"
            )));
        }
        if r.len() != len {
            return Err(StoreError::Format(format!(
                "descriptor payload length mismatch: header says {len}, column holds {}",
                r.len()
            )));
        }
        let got = crc32fast::hash(r);
        if got != h.checksum {
            return Err(StoreError::CrcMismatch {
                expected: h.checksum,
                actual: got,
            });
        }
        let d: Descriptor =
            postcard::from_bytes(r).map_err(|e| StoreError::Decode(e.to_string()))?;
        d.layout.validate()?;
        Ok(d)
    }
}

/// Fixed-size header preceding the descriptor payload.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorHeader {
    /// Magic bytes (should equal `DESCRIPTOR_MAGIC`).
    pub magic: [u8; 4],
    /// Format version (should equal `FORMAT_VERSION`).
    pub version: u32,
    /// Payload length in bytes.
    pub payload_len: u32,
    /// CRC32 over the payload.
    pub checksum: u32,
}

impl DescriptorHeader {
    /// Number of bytes in the serialized header.
    pub const SIZE: usize = 4 + 4 + 4 + 4;

    /// Write the header to a stream.
    pub fn write<W: Write>(&self, w: &mut W) -> StoreResult<()> {
        w.write_all(&self.magic)?;
        w.write_u32::<LittleEndian>(self.version)?;
        w.write_u32::<LittleEndian>(self.payload_len)?;
        w.write_u32::<LittleEndian>(self.checksum)?;
        Ok(())
    }

    /// Read the header from a stream.
    pub fn read<R: Read + ?Sized>(r: &mut R) -> StoreResult<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)
            .map_err(|_| StoreError::Format("truncated descriptor header".into()))?;
        if magic != DESCRIPTOR_MAGIC {
            return Err(StoreError::Format("invalid descriptor magic".into()));
        }
        let version = r
            .read_u32::<LittleEndian>()
            .map_err(|_| StoreError::Format("truncated descriptor header".into()))?;
        if version != FORMAT_VERSION {
            return Err(StoreError::Format(format!(
                "descriptor version mismatch (got {version}, expected {FORMAT_VERSION})"
            )));
        }
        let mut rest = [0u32; 2];
        r.read_u32_into::<LittleEndian>(&mut rest)
            .map_err(|_| StoreError::Format("truncated descriptor header".into()))?;
        Ok(Self {
            magic,
            version,
            payload_len: rest[0],
            checksum: rest[1],
        })
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// First generation of a newly created file.
///
/// Seeded from the clock and strictly increasing within the process, so a path
/// that is deleted and created again does not reuse an earlier incarnation's
/// generations.
pub fn fresh_generation() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);
    let seed = now_millis() << 16;
    let next = |prev: u64| prev.max(seed) + 1;
    match LAST.fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| Some(next(p))) {
        Ok(prev) | Err(prev) => next(prev),
    }
}
