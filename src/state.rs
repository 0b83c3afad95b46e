//! Single-blob state files stored through the block directory.
//!
//! Holds one postcard-encoded value behind a small header and CRC32, for
//! callers that keep metadata (segment lists, commit points) next to their
//! index files.
//!
//! ## Public invariants (must not change without a format bump)
//!
//! - **Header**: `[STATE_MAGIC][FORMAT_VERSION][payload_len:u64][crc32:u32]`
//!   (little-endian for integers).
//! - **Checksum**: `crc32fast` over the payload bytes.
//! - **Publish**: the descriptor is committed once, after every block is
//!   written, so readers see either the previous value or the new one.

use crate::directory::BlockDirectory;
use crate::error::{StoreError, StoreResult};
use crate::formats::{FORMAT_VERSION, STATE_MAGIC};
use crate::stream::{BlockInputStream, BlockOutputStream};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Upper bound on state payload size, to keep corrupt headers from driving
/// huge allocations.
pub const MAX_STATE_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Fixed-size header stored at the start of a state file.
#[derive(Debug, Clone, Copy)]
pub struct StateHeader {
    /// Magic bytes (should equal `STATE_MAGIC`).
    pub magic: [u8; 4],
    /// Format version (should equal `FORMAT_VERSION`).
    pub version: u32,
    /// Payload length in bytes.
    pub payload_len: u64,
    /// CRC32 computed over payload bytes.
    pub checksum: u32,
}

impl StateHeader {
    /// Number of bytes in the serialized header.
    pub const SIZE: usize = 4 + 4 + 8 + 4;

    /// Write the header to a stream.
    pub fn write<W: Write>(&self, w: &mut W) -> StoreResult<()> {
        w.write_all(&self.magic)?;
        w.write_u32::<LittleEndian>(self.version)?;
        w.write_u64::<LittleEndian>(self.payload_len)?;
        w.write_u32::<LittleEndian>(self.checksum)?;
        Ok(())
    }

    /// Read the header from a stream.
    pub fn read<R: Read + ?Sized>(r: &mut R) -> StoreResult<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != STATE_MAGIC {
            return Err(StoreError::Format("invalid state magic".into()));
        }
        let version = r.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(StoreError::Format(format!(
                "state version mismatch: {version}"
            )));
        }
        Ok(Self {
            magic,
            version,
            payload_len: r.read_u64::<LittleEndian>()?,
            checksum: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// Read/write state files in a [`BlockDirectory`].
#[derive(Debug, Clone)]
pub struct StateFile {
    dir: BlockDirectory,
}

impl StateFile {
    /// State helper for `dir`.
    pub fn new(dir: BlockDirectory) -> Self {
        Self { dir }
    }

    /// Replace the content of `name` with `value`.
    pub fn write_postcard<T: serde::Serialize>(&self, name: &str, value: &T) -> StoreResult<()> {
        let payload =
            postcard::to_allocvec(value).map_err(|e| StoreError::Encode(e.to_string()))?;
        if payload.len() > MAX_STATE_PAYLOAD_BYTES {
            return Err(StoreError::Format(format!(
                "state payload too large: {} bytes (max {})",
                payload.len(),
                MAX_STATE_PAYLOAD_BYTES
            )));
        }
        let h = StateHeader {
            magic: STATE_MAGIC,
            version: FORMAT_VERSION,
            payload_len: payload.len() as u64,
            checksum: crc32fast::hash(&payload),
        };
        let mut buf = Vec::with_capacity(StateHeader::SIZE + payload.len());
        h.write(&mut buf)?;
        buf.extend_from_slice(&payload);

        let mut out = BlockOutputStream::open(&self.dir, name, false)?;
        out.write_all(&buf)?;
        out.close()
    }

    /// Decode `name` after CRC validation.
    pub fn read_postcard<T: serde::de::DeserializeOwned>(&self, name: &str) -> StoreResult<T> {
        let mut r = BlockInputStream::open(&self.dir, name)?;
        let h = StateHeader::read(&mut r)?;
        let len = usize::try_from(h.payload_len)
            .map_err(|_| StoreError::Format("payload_len overflow".into()))?;
        if len > MAX_STATE_PAYLOAD_BYTES {
            return Err(StoreError::Format(format!(
                "state payload too large: {len} bytes (max {MAX_STATE_PAYLOAD_BYTES})"
            )));
        }
        let mut payload = vec![0u8; len];
        r.read_exact(&mut payload)?;
        let got = crc32fast::hash(&payload);
        if got != h.checksum {
            return Err(StoreError::CrcMismatch {
                expected: h.checksum,
                actual: got,
            });
        }
        postcard::from_bytes(&payload).map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Like [`StateFile::read_postcard`], but a missing file yields `None`.
    pub fn try_read_postcard<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> StoreResult<Option<T>> {
        match self.read_postcard(name) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;
    use crate::metrics::StoreMetrics;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct Segments {
        generation: u64,
        names: Vec<String>,
    }

    fn dir() -> BlockDirectory {
        BlockDirectory::open(
            Arc::new(MemoryStore::new()),
            "/index/main",
            DirectoryConfig::new("t").with_block_size(8),
            Arc::new(StoreMetrics::new()),
        )
        .unwrap()
    }

    #[test]
    fn state_roundtrip_spans_blocks() {
        let state = StateFile::new(dir());
        let v = Segments {
            generation: 3,
            names: vec!["_0.cfs".into(), "_1.cfs".into(), "東京".into()],
        };
        state.write_postcard("segments", &v).unwrap();
        let out: Segments = state.read_postcard("segments").unwrap();
        assert_eq!(out, v);
    }

    #[test]
    fn rewrite_replaces_previous_value() {
        let state = StateFile::new(dir());
        let long = Segments {
            generation: 1,
            names: (0..20).map(|i| format!("_{i}.si")).collect(),
        };
        state.write_postcard("segments", &long).unwrap();
        let short = Segments {
            generation: 2,
            names: vec![],
        };
        state.write_postcard("segments", &short).unwrap();
        assert_eq!(state.read_postcard::<Segments>("segments").unwrap(), short);
    }

    #[test]
    fn missing_state_is_none() {
        let state = StateFile::new(dir());
        assert_eq!(state.try_read_postcard::<Segments>("nope").unwrap(), None);
    }

    #[test]
    fn corrupt_payload_is_crc_mismatch() {
        let d = dir();
        let state = StateFile::new(d.clone());
        state
            .write_postcard(
                "s",
                &Segments {
                    generation: 9,
                    names: vec!["x".into()],
                },
            )
            .unwrap();

        let mut bytes = Vec::new();
        BlockInputStream::open(&d, "s")
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let mut out = BlockOutputStream::open(&d, "s", false).unwrap();
        out.write_all(&bytes).unwrap();
        out.close().unwrap();

        let err = state.read_postcard::<Segments>("s").unwrap_err();
        assert!(matches!(err, StoreError::CrcMismatch { .. }));
    }

    #[test]
    fn bad_magic_is_format_error() {
        let d = dir();
        let mut out = BlockOutputStream::open(&d, "s", false).unwrap();
        out.write_all(b"NOPE\x01\x00\x00\x00").unwrap();
        out.close().unwrap();
        let err = StateFile::new(d).read_postcard::<Segments>("s").unwrap_err();
        assert!(matches!(err, StoreError::Format(_)));
    }
}
