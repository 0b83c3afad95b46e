//! `std::io` stream wrappers over [`FileHandle`].

use crate::directory::BlockDirectory;
use crate::error::{StoreError, StoreResult};
use crate::handle::{FileHandle, IoContext, OpenMode};
use std::io::{Read, Write};

/// Byte output stream.
///
/// With `append == false` the first write supersedes prior content; with
/// `append == true` bytes land in new blocks after the existing last block.
#[derive(Debug)]
pub struct BlockOutputStream {
    handle: FileHandle,
}

impl BlockOutputStream {
    /// Open `name` in `dir`.
    pub fn open(dir: &BlockDirectory, name: &str, append: bool) -> StoreResult<Self> {
        let mode = if append {
            OpenMode::CreateOrAppend
        } else {
            OpenMode::Create
        };
        Self::from_handle(dir.open_handle(name, mode)?)
    }

    /// Wrap an already opened write handle.
    pub fn from_handle(handle: FileHandle) -> StoreResult<Self> {
        if !handle.mode().is_write() {
            return Err(StoreError::InvalidState(format!(
                "{} is not open for writing",
                handle.path()
            )));
        }
        Ok(Self { handle })
    }

    /// Commit every buffered byte and publish the descriptor before returning.
    pub fn force(&mut self) -> StoreResult<()> {
        self.handle.flush()
    }

    /// Bytes written through this stream plus any preserved prefix.
    pub fn length(&self) -> u64 {
        self.handle.length()
    }

    /// Force and close the underlying handle.
    pub fn close(mut self) -> StoreResult<()> {
        self.handle.close()
    }
}

impl Write for BlockOutputStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.handle.write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(self.force()?)
    }
}

/// Byte input stream.
#[derive(Debug)]
pub struct BlockInputStream {
    handle: FileHandle,
}

impl BlockInputStream {
    /// Open `name` in `dir` for reading.
    pub fn open(dir: &BlockDirectory, name: &str) -> StoreResult<Self> {
        Ok(Self {
            handle: dir.open_input(name, IoContext::ReadOnce)?,
        })
    }

    /// Next byte, or `None` at end of stream.
    pub fn read_byte(&mut self) -> StoreResult<Option<u8>> {
        self.handle.read()
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> u64 {
        self.handle.length() - self.handle.position()
    }

    /// Close the underlying handle.
    pub fn close(mut self) -> StoreResult<()> {
        self.handle.close()
    }
}

impl Read for BlockInputStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(self.handle.read_into(buf)?)
    }
}
