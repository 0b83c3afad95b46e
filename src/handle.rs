//! Open-mode-scoped cursor over one path.
//!
//! A write handle accumulates the current block in memory. A block is written
//! to the store as soon as it is full (or sealed by a forced `write_byte`); the
//! descriptor is only touched by an explicit [`FileHandle::flush`] or
//! [`FileHandle::close`]. Dropping a handle never flushes.
//!
//! A handle is not shareable between threads; open one per worker.

use crate::codec::BlockLayout;
use crate::directory::DirectoryInner;
use crate::error::{StoreError, StoreResult};
use crate::path::Path;
use log::{debug, warn};
use std::io::SeekFrom;
use std::sync::Arc;

/// How a handle was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; the path must exist.
    Read,
    /// Write from block 0; prior content is superseded on the first write.
    Create,
    /// Write after the last existing block (or from 0 if the path is new).
    CreateOrAppend,
}

impl OpenMode {
    /// Whether the mode writes.
    pub fn is_write(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// What the caller intends to do with a file, as an indexing engine passes it
/// to `create_output`, `open_input` and `create_slicer`.
///
/// Block I/O is identical for every context; it is recorded in the open/close
/// log lines only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoContext {
    /// No particular access pattern.
    #[default]
    Default,
    /// Read once front to back (checksums, segment info).
    ReadOnce,
    /// Written by a segment flush.
    Flush,
    /// Read or written by a merge.
    Merge,
}

struct ReadState {
    layout: BlockLayout,
    generation: u64,
    pos: u64,
    current: Option<(u32, Arc<Vec<u8>>)>,
}

struct WriteState {
    /// Blocks already written to the store.
    sealed: BlockLayout,
    /// In-progress block, written as block `sealed.block_count()` on flush.
    buf: Vec<u8>,
    /// Descriptor generation this writer builds on (`None`: path did not exist).
    expected: Option<u64>,
    /// Whether `Create` has superseded the old content yet.
    started: bool,
    /// Bytes written since the last commit.
    dirty: bool,
}

enum State {
    Read(ReadState),
    Write(WriteState),
}

/// A sequential reader or writer over one path.
pub struct FileHandle {
    dir: Arc<DirectoryInner>,
    path: Path,
    mode: OpenMode,
    context: IoContext,
    state: State,
    closed: bool,
}

impl FileHandle {
    pub(crate) fn open(
        dir: Arc<DirectoryInner>,
        path: Path,
        mode: OpenMode,
        context: IoContext,
    ) -> StoreResult<Self> {
        let existing = dir.blocks.read_descriptor(&path)?;
        if existing.as_ref().is_some_and(|d| d.is_directory()) {
            return Err(StoreError::InvalidState(format!("{path} is a directory")));
        }
        let state = match mode {
            OpenMode::Read => {
                let d = existing.ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                State::Read(ReadState {
                    layout: d.layout,
                    generation: d.generation,
                    pos: 0,
                    current: None,
                })
            }
            OpenMode::Create => State::Write(WriteState {
                sealed: BlockLayout::empty(dir.block_size()),
                buf: Vec::with_capacity(dir.block_size()),
                expected: None,
                started: false,
                dirty: false,
            }),
            OpenMode::CreateOrAppend => {
                let (sealed, expected) = match existing {
                    Some(d) => (d.layout, Some(d.generation)),
                    None => (BlockLayout::empty(dir.block_size()), None),
                };
                State::Write(WriteState {
                    sealed,
                    buf: Vec::with_capacity(dir.block_size()),
                    expected,
                    started: true,
                    dirty: false,
                })
            }
        };
        debug!("opened {path} ({mode:?}, {context:?})");
        Ok(Self {
            dir,
            path,
            mode,
            context,
            state,
            closed: false,
        })
    }

    /// Path this handle addresses.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode the handle was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Context the handle was opened with.
    pub fn context(&self) -> IoContext {
        self.context
    }

    /// Whether [`FileHandle::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Logical length: the file length for readers, bytes written so far for writers.
    pub fn length(&self) -> u64 {
        match &self.state {
            State::Read(r) => r.layout.length(),
            State::Write(w) => w.sealed.length() + w.buf.len() as u64,
        }
    }

    /// Current cursor.
    pub fn position(&self) -> u64 {
        match &self.state {
            State::Read(r) => r.pos,
            State::Write(_) => self.length(),
        }
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::ClosedHandle(self.path.to_string()));
        }
        self.dir.check_open()
    }

    fn reader(&mut self) -> StoreResult<&mut ReadState> {
        self.check_open()?;
        match &mut self.state {
            State::Read(r) => Ok(r),
            State::Write(_) => Err(StoreError::InvalidState(format!(
                "{} is open for writing",
                self.path
            ))),
        }
    }

    fn writer(&mut self) -> StoreResult<&mut WriteState> {
        self.check_open()?;
        let State::Write(w) = &mut self.state else {
            return Err(StoreError::InvalidState(format!(
                "{} is open for reading",
                self.path
            )));
        };
        if !w.started {
            w.expected = self.dir.supersede(&self.path)?;
            w.started = true;
        }
        Ok(w)
    }

    /// Next byte, or `None` at end of file.
    pub fn read(&mut self) -> StoreResult<Option<u8>> {
        let mut b = [0u8; 1];
        Ok(match self.read_into(&mut b)? {
            0 => None,
            _ => Some(b[0]),
        })
    }

    /// Read up to `buf.len()` bytes; returns 0 only at end of file.
    pub fn read_into(&mut self, buf: &mut [u8]) -> StoreResult<usize> {
        let path = self.path.clone();
        let blocks = self.dir.blocks.clone();
        let r = self.reader()?;
        let mut n = 0;
        while n < buf.len() && r.pos < r.layout.length() {
            let (index, start) = r.layout.locate(r.pos);
            let cached = match &r.current {
                Some((i, b)) if *i == index => Some(b.clone()),
                _ => None,
            };
            let block = match cached {
                Some(b) => b,
                None => {
                    let b = blocks.read_block(&path, r.generation, index)?;
                    if b.len() < r.layout.block_len(index) {
                        return Err(StoreError::Format(format!(
                            "{path} block {index} holds {} bytes, descriptor expects {}",
                            b.len(),
                            r.layout.block_len(index)
                        )));
                    }
                    r.current = Some((index, b.clone()));
                    b
                }
            };
            let avail = r.layout.block_len(index) - start;
            let take = avail.min(buf.len() - n);
            buf[n..n + take].copy_from_slice(&block[start..start + take]);
            n += take;
            r.pos += take as u64;
        }
        Ok(n)
    }

    /// Move the read cursor. Seeking to the end is allowed; past it is `OutOfBounds`.
    pub fn seek(&mut self, pos: u64) -> StoreResult<()> {
        let path = self.path.to_string();
        let r = self.reader()?;
        if pos > r.layout.length() {
            return Err(StoreError::OutOfBounds {
                what: path,
                offset: pos,
                length: 0,
                limit: r.layout.length(),
            });
        }
        r.pos = pos;
        Ok(())
    }

    /// Append `buf`, writing each block to the store as it fills.
    pub fn write(&mut self, buf: &[u8]) -> StoreResult<()> {
        let block_size = self.dir.block_size();
        let mut rest = buf;
        while !rest.is_empty() {
            let w = self.writer()?;
            let take = (block_size - w.buf.len()).min(rest.len());
            w.buf.extend_from_slice(&rest[..take]);
            w.dirty = true;
            rest = &rest[take..];
            if w.buf.len() == block_size {
                self.seal()?;
            }
        }
        Ok(())
    }

    /// Append one byte; with `force_new_block` the current block is written out
    /// right away and the next byte starts a new block.
    pub fn write_byte(&mut self, value: u8, force_new_block: bool) -> StoreResult<()> {
        let block_size = self.dir.block_size();
        let w = self.writer()?;
        w.buf.push(value);
        w.dirty = true;
        if force_new_block || w.buf.len() == block_size {
            self.seal()?;
        }
        Ok(())
    }

    /// Write the in-memory block as the next block and start a fresh one.
    fn seal(&mut self) -> StoreResult<()> {
        let (dir, path) = (self.dir.clone(), self.path.clone());
        let w = self.writer()?;
        if w.buf.is_empty() {
            return Ok(());
        }
        let index = w.sealed.block_count();
        dir.blocks.write_block(&path, index, &w.buf)?;
        w.sealed.push_block(w.buf.len());
        w.buf.clear();
        Ok(())
    }

    /// Write the partial block (if any) and publish the descriptor.
    ///
    /// The partial block stays in memory, so later writes keep filling it.
    /// No-op if nothing was written since the last flush.
    pub fn flush(&mut self) -> StoreResult<()> {
        let (dir, path) = (self.dir.clone(), self.path.clone());
        self.check_open()?;
        let State::Write(w) = &mut self.state else {
            return Ok(());
        };
        if !w.dirty {
            return Ok(());
        }
        let mut layout = w.sealed.clone();
        let pending = if w.buf.is_empty() {
            None
        } else {
            layout.push_block(w.buf.len());
            Some((w.sealed.block_count(), w.buf.as_slice()))
        };
        let generation = dir.commit(&path, &layout, w.expected, pending)?;
        w.expected = Some(generation);
        w.dirty = false;
        Ok(())
    }

    /// Flush (for writers) and close. Closing twice is a no-op.
    pub fn close(&mut self) -> StoreResult<()> {
        if self.closed {
            return Ok(());
        }
        let res = self.flush();
        self.closed = true;
        debug!("closed {} ({:?})", self.path, self.context);
        res
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if let State::Write(w) = &self.state {
            if !self.closed && w.dirty {
                warn!(
                    "{} dropped with {} unflushed bytes; call close()",
                    self.path,
                    self.length()
                );
            }
        }
    }
}

impl std::io::Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(self.read_into(buf)?)
    }
}

impl std::io::Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let len = self.length() as i128;
        let target = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::End(d) => len + d as i128,
            SeekFrom::Current(d) => self.position() as i128 + d as i128,
        };
        let target = u64::try_from(target).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "seek before start")
        })?;
        FileHandle::seek(self, target)?;
        Ok(target)
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("context", &self.context)
            .field("position", &self.position())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;
    use crate::directory::BlockDirectory;
    use crate::formats::block_column;
    use crate::metrics::StoreMetrics;
    use crate::store::{ColumnStore, MemoryStore};

    fn open(block_size: usize) -> (BlockDirectory, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let dir = BlockDirectory::open(
            store.clone(),
            "/idx",
            DirectoryConfig::new("t").with_block_size(block_size),
            Arc::new(StoreMetrics::new()),
        )
        .unwrap();
        (dir, store)
    }

    fn block(store: &MemoryStore, row: &str, index: u32) -> Option<Vec<u8>> {
        store.get_column("t", row, &block_column(index)).unwrap()
    }

    fn read_all(h: &mut FileHandle) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(b) = h.read().unwrap() {
            out.push(b);
        }
        out
    }

    #[test]
    fn forced_blocks_hold_one_byte_each() {
        let (dir, store) = open(4);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        for b in [67u8, 66, 65] {
            h.write_byte(b, true).unwrap();
        }
        h.close().unwrap();

        assert_eq!(block(&store, "/idx/f", 0).unwrap(), vec![67]);
        assert_eq!(block(&store, "/idx/f", 1).unwrap(), vec![66]);
        assert_eq!(block(&store, "/idx/f", 2).unwrap(), vec![65]);
        assert_eq!(block(&store, "/idx/f", 3), None);

        let mut r = dir.open_input("f", IoContext::Default).unwrap();
        assert_eq!(read_all(&mut r), vec![67, 66, 65]);
    }

    #[test]
    fn append_continues_at_next_block_index() {
        let (dir, store) = open(4);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        for b in [67u8, 66, 65] {
            h.write_byte(b, true).unwrap();
        }
        h.close().unwrap();

        let mut a = dir.append_output("f").unwrap();
        a.write(&[1]).unwrap();
        a.close().unwrap();

        assert_eq!(block(&store, "/idx/f", 0).unwrap(), vec![67]);
        assert_eq!(block(&store, "/idx/f", 1).unwrap(), vec![66]);
        assert_eq!(block(&store, "/idx/f", 2).unwrap(), vec![65]);
        assert_eq!(block(&store, "/idx/f", 3).unwrap(), vec![1]);
        assert_eq!(dir.file_length("f").unwrap(), 4);

        let mut r = dir.open_input("f", IoContext::Default).unwrap();
        assert_eq!(read_all(&mut r), vec![67, 66, 65, 1]);
    }

    #[test]
    fn bulk_write_chunks_by_block_size() {
        let (dir, store) = open(4);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        h.write(&[70, 69, 68, 67, 66, 65]).unwrap();
        h.close().unwrap();
        assert_eq!(block(&store, "/idx/f", 0).unwrap(), vec![70, 69, 68, 67]);
        assert_eq!(block(&store, "/idx/f", 1).unwrap(), vec![66, 65]);
        assert_eq!(dir.file_length("f").unwrap(), 6);
    }

    #[test]
    fn create_supersedes_previous_content() {
        let (dir, store) = open(4);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        h.write(b"0123456789").unwrap();
        h.close().unwrap();

        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        h.write(b"ab").unwrap();
        h.close().unwrap();

        assert_eq!(dir.file_length("f").unwrap(), 2);
        assert_eq!(block(&store, "/idx/f", 1), None);
        assert_eq!(block(&store, "/idx/f", 2), None);
        let mut r = dir.open_input("f", IoContext::Default).unwrap();
        assert_eq!(read_all(&mut r), b"ab");
    }

    #[test]
    fn close_without_writes_is_a_noop() {
        let (dir, _) = open(4);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        h.close().unwrap();
        assert!(!dir.file_exists("f").unwrap());

        let mut h = dir.create_output("g", IoContext::Default).unwrap();
        h.write(b"abc").unwrap();
        h.close().unwrap();
        let before = dir.file_modified("g").unwrap();
        let mut h = dir.create_output("g", IoContext::Default).unwrap();
        h.close().unwrap();
        assert_eq!(dir.file_length("g").unwrap(), 3);
        assert_eq!(dir.file_modified("g").unwrap(), before);
    }

    #[test]
    fn handles_remember_their_context() {
        let (dir, _) = open(4);
        let mut h = dir.create_output("f", IoContext::Flush).unwrap();
        assert_eq!(h.context(), IoContext::Flush);
        h.write(b"abc").unwrap();
        h.close().unwrap();
        let r = dir.open_input("f", IoContext::ReadOnce).unwrap();
        assert_eq!(r.context(), IoContext::ReadOnce);
        assert_eq!(r.mode(), OpenMode::Read);
        let a = dir.append_output("f").unwrap();
        assert_eq!(a.context(), IoContext::Default);
    }

    #[test]
    fn closed_handle_rejects_io() {
        let (dir, _) = open(4);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        h.write(b"abc").unwrap();
        h.close().unwrap();
        assert!(matches!(h.write(b"x"), Err(StoreError::ClosedHandle(_))));
        assert!(matches!(
            h.write_byte(1, false),
            Err(StoreError::ClosedHandle(_))
        ));
        h.close().unwrap();

        let mut r = dir.open_input("f", IoContext::Default).unwrap();
        r.close().unwrap();
        assert!(matches!(r.read(), Err(StoreError::ClosedHandle(_))));
    }

    #[test]
    fn open_input_on_missing_path_is_not_found() {
        let (dir, _) = open(4);
        assert!(dir.open_input("nope", IoContext::Default).unwrap_err().is_not_found());
    }

    #[test]
    fn read_returns_none_at_eof_repeatedly() {
        let (dir, _) = open(4);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        h.write(b"ab").unwrap();
        h.close().unwrap();
        let mut r = dir.open_input("f", IoContext::Default).unwrap();
        assert_eq!(r.read().unwrap(), Some(b'a'));
        assert_eq!(r.read().unwrap(), Some(b'b'));
        assert_eq!(r.read().unwrap(), None);
        assert_eq!(r.read().unwrap(), None);
    }

    #[test]
    fn flush_keeps_partial_block_open() {
        let (dir, store) = open(4);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        h.write(b"ab").unwrap();
        h.flush().unwrap();
        assert_eq!(dir.file_length("f").unwrap(), 2);
        h.write(b"cd").unwrap();
        h.close().unwrap();
        assert_eq!(block(&store, "/idx/f", 0).unwrap(), b"abcd");
        assert_eq!(block(&store, "/idx/f", 1), None);
    }

    #[test]
    fn seek_then_read_crosses_blocks() {
        let (dir, _) = open(3);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        h.write(b"0123456789").unwrap();
        h.close().unwrap();
        let mut r = dir.open_input("f", IoContext::Default).unwrap();
        r.seek(2).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(r.read_into(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"23456");
        assert!(matches!(r.seek(11), Err(StoreError::OutOfBounds { .. })));
        r.seek(10).unwrap();
        assert_eq!(r.read().unwrap(), None);
    }

    #[test]
    fn racing_appenders_detect_concurrent_modification() {
        let (dir, _) = open(4);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        h.write(b"ab").unwrap();
        h.close().unwrap();

        let mut a = dir.append_output("f").unwrap();
        let mut b = dir.append_output("f").unwrap();
        a.write(b"x").unwrap();
        a.close().unwrap();
        b.write(b"y").unwrap();
        assert!(matches!(
            b.close(),
            Err(StoreError::ConcurrentModification { .. })
        ));
        assert_eq!(dir.file_length("f").unwrap(), 3);
    }

    #[test]
    fn reading_a_writer_is_invalid_state() {
        let (dir, _) = open(4);
        let mut h = dir.create_output("f", IoContext::Default).unwrap();
        assert!(matches!(h.read(), Err(StoreError::InvalidState(_))));
        h.close().unwrap();
    }
}
