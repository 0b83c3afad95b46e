//! Bounded random-access views over a committed file.
//!
//! A [`Slicer`] captures the file's block layout when it is created; every
//! [`SliceReader`] it opens reads through that snapshot. Truncating or deleting
//! the file while slices are open is not supported: reads then fail with
//! `NotFound` or `Format` rather than returning stale bytes silently.

use crate::codec::BlockLayout;
use crate::directory::DirectoryInner;
use crate::error::{StoreError, StoreResult};
use crate::path::Path;
use std::sync::Arc;

/// Factory for [`SliceReader`]s over one file.
pub struct Slicer {
    dir: Arc<DirectoryInner>,
    path: Path,
    layout: Arc<BlockLayout>,
    generation: u64,
}

impl Slicer {
    pub(crate) fn new(
        dir: Arc<DirectoryInner>,
        path: Path,
        layout: BlockLayout,
        generation: u64,
    ) -> Self {
        Self {
            dir,
            path,
            layout: Arc::new(layout),
            generation,
        }
    }

    /// Path the slicer reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File length captured when the slicer was created.
    pub fn length(&self) -> u64 {
        self.layout.length()
    }

    /// A reader over `[offset, offset + length)`.
    ///
    /// The window must lie inside the file, else `OutOfBounds`.
    pub fn open_slice(
        &self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> StoreResult<SliceReader> {
        self.dir.check_open()?;
        check_window(description, offset, length, self.length())?;
        Ok(SliceReader {
            dir: self.dir.clone(),
            path: self.path.clone(),
            layout: self.layout.clone(),
            generation: self.generation,
            description: description.to_string(),
            base: offset,
            length,
            pos: 0,
            current: None,
        })
    }

    /// A reader over the whole file.
    pub fn open_full(&self, description: &str) -> StoreResult<SliceReader> {
        self.open_slice(description, 0, self.length())
    }
}

fn check_window(what: &str, offset: u64, length: u64, limit: u64) -> StoreResult<()> {
    if offset.checked_add(length).is_none_or(|end| end > limit) {
        return Err(StoreError::OutOfBounds {
            what: what.to_string(),
            offset,
            length,
            limit,
        });
    }
    Ok(())
}

/// Read-only window with its own cursor.
///
/// Cloning yields an independent cursor over the same window.
#[derive(Clone)]
pub struct SliceReader {
    dir: Arc<DirectoryInner>,
    path: Path,
    layout: Arc<BlockLayout>,
    generation: u64,
    description: String,
    base: u64,
    length: u64,
    pos: u64,
    current: Option<(u32, Arc<Vec<u8>>)>,
}

impl SliceReader {
    /// Window length.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Cursor, relative to the window start.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Bytes left before the end of the window.
    pub fn remaining(&self) -> u64 {
        self.length - self.pos
    }

    /// Description given when the slice was opened.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Move the cursor (relative to the window start).
    pub fn seek(&mut self, pos: u64) -> StoreResult<()> {
        if pos > self.length {
            return Err(self.out_of_bounds(pos, 0));
        }
        self.pos = pos;
        Ok(())
    }

    /// A narrower window, relative to this one.
    pub fn slice(&self, description: &str, offset: u64, length: u64) -> StoreResult<SliceReader> {
        check_window(description, offset, length, self.length)?;
        Ok(SliceReader {
            description: description.to_string(),
            base: self.base + offset,
            length,
            pos: 0,
            ..self.clone()
        })
    }

    fn out_of_bounds(&self, offset: u64, length: u64) -> StoreError {
        StoreError::OutOfBounds {
            what: format!("{} ({})", self.description, self.path),
            offset,
            length,
            limit: self.length,
        }
    }

    fn block(&mut self, index: u32) -> StoreResult<Arc<Vec<u8>>> {
        if let Some((i, b)) = &self.current {
            if *i == index {
                return Ok(b.clone());
            }
        }
        self.dir.check_open()?;
        let b = self.dir.blocks.read_block(&self.path, self.generation, index)?;
        let want = self.layout.block_len(index);
        if b.len() < want {
            return Err(StoreError::Format(format!(
                "{} block {index} holds {} bytes, layout expects {want}",
                self.path,
                b.len()
            )));
        }
        self.current = Some((index, b.clone()));
        Ok(b)
    }

    /// Fill `buf` completely; `OutOfBounds` if the window has fewer bytes left.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> StoreResult<()> {
        let len = buf.len() as u64;
        if len > self.remaining() {
            return Err(self.out_of_bounds(self.pos, len));
        }
        let spans = self.layout.span(self.base + self.pos, len)?;
        let mut n = 0;
        for s in spans {
            let block = self.block(s.index)?;
            buf[n..n + s.len].copy_from_slice(&block[s.start..s.start + s.len]);
            n += s.len;
        }
        self.pos += len;
        Ok(())
    }

    /// Next byte; `OutOfBounds` at the end of the window.
    pub fn read_byte(&mut self) -> StoreResult<u8> {
        let mut b = [0u8; 1];
        self.read_bytes(&mut b)?;
        Ok(b[0])
    }

    /// Read `len` bytes starting at window offset `offset` without moving the cursor.
    pub fn read_at(&mut self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        if offset.checked_add(len as u64).is_none_or(|end| end > self.length) {
            return Err(self.out_of_bounds(offset, len as u64));
        }
        let saved = self.pos;
        self.pos = offset;
        let mut out = vec![0u8; len];
        let res = self.read_bytes(&mut out);
        self.pos = saved;
        res.map(|()| out)
    }
}

impl std::io::Read for SliceReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.remaining() as usize);
        self.read_bytes(&mut buf[..n])?;
        Ok(n)
    }
}

impl std::fmt::Debug for Slicer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slicer")
            .field("path", &self.path)
            .field("generation", &self.generation)
            .finish()
    }
}

impl std::fmt::Debug for SliceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceReader")
            .field("path", &self.path)
            .field("description", &self.description)
            .field("base", &self.base)
            .field("length", &self.length)
            .field("pos", &self.pos)
            .finish()
    }
}
