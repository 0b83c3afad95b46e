//! The directory contract consumed by the search engine.
//!
//! A [`BlockDirectory`] is scoped to one root path inside one storage scope.
//! Names passed to it are resolved relative to that root.
//!
//! ## Membership
//!
//! Directory-kind descriptors list the leaf names of their direct children.
//! A file is linked into its parent when its first descriptor is committed and
//! unlinked when it is deleted. Listing reads that membership; it never scans.
//!
//! ## Concurrency
//!
//! Descriptor read-modify-write is serialized per path with striped locks, and
//! no code path holds two stripes at once. Writers additionally carry the
//! descriptor generation they started from; a mismatch at commit time is
//! reported as `ConcurrentModification` instead of silently losing an update.

use crate::blocks::BlockAccess;
use crate::codec::BlockLayout;
use crate::config::{DirectoryConfig, SyncPolicy};
use crate::descriptor::{fresh_generation, now_millis, Descriptor, EntryKind};
use crate::error::{StoreError, StoreResult};
use crate::handle::{FileHandle, IoContext, OpenMode};
use crate::metrics::{MetricsSnapshot, StoreMetrics};
use crate::path::Path;
use crate::slicer::Slicer;
use crate::store::ColumnStore;
use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const LOCK_STRIPES: usize = 64;

struct PathLocks {
    stripes: Vec<Mutex<()>>,
}

impl PathLocks {
    fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn lock(&self, path: &Path) -> MutexGuard<'_, ()> {
        let i = crc32fast::hash(path.row_key().as_bytes()) as usize % LOCK_STRIPES;
        self.stripes[i].lock()
    }
}

/// One entry returned by [`BlockDirectory::list_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Full canonical path of the entry.
    pub path: Path,
    /// File or directory.
    pub kind: EntryKind,
    /// Length in bytes (zero for directories).
    pub length: u64,
    /// Last modification, milliseconds since the Unix epoch.
    pub last_modified_ms: u64,
}

pub(crate) struct DirectoryInner {
    root: Path,
    config: DirectoryConfig,
    pub(crate) blocks: Arc<dyn BlockAccess>,
    metrics: Arc<StoreMetrics>,
    locks: PathLocks,
    closed: AtomicBool,
}

impl DirectoryInner {
    pub(crate) fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub(crate) fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::ClosedHandle(format!(
                "directory {} is closed",
                self.root
            )));
        }
        Ok(())
    }

    /// Make `path` a directory, creating (and linking) missing ancestors.
    fn ensure_dir(&self, path: &Path) -> StoreResult<()> {
        let created = {
            let _g = self.locks.lock(path);
            match self.blocks.read_descriptor(path)? {
                Some(d) if d.is_directory() => false,
                Some(_) => {
                    return Err(StoreError::InvalidPath(format!(
                        "{path} is a file, not a directory"
                    )))
                }
                None => {
                    let mut d = Descriptor::new_directory(self.block_size());
                    d.generation = 1;
                    self.blocks.write_descriptor(path, &d)?;
                    true
                }
            }
        };
        if created {
            if let Some(parent) = path.parent(true) {
                self.ensure_dir(&parent)?;
                self.add_child(&parent, path.leaf())?;
            }
        }
        Ok(())
    }

    fn add_child(&self, parent: &Path, leaf: &str) -> StoreResult<()> {
        let _g = self.locks.lock(parent);
        let mut d = self
            .blocks
            .read_descriptor(parent)?
            .ok_or_else(|| StoreError::NotFound(parent.to_string()))?;
        if !d.is_directory() {
            return Err(StoreError::InvalidPath(format!(
                "{parent} is a file, not a directory"
            )));
        }
        if d.children.insert(leaf.to_string()) {
            d.generation += 1;
            d.last_modified_ms = now_millis();
            self.blocks.write_descriptor(parent, &d)?;
        }
        Ok(())
    }

    fn remove_child(&self, parent: &Path, leaf: &str) -> StoreResult<()> {
        let _g = self.locks.lock(parent);
        let Some(mut d) = self.blocks.read_descriptor(parent)? else {
            return Ok(());
        };
        if d.children.remove(leaf) {
            d.generation += 1;
            d.last_modified_ms = now_millis();
            self.blocks.write_descriptor(parent, &d)?;
        }
        Ok(())
    }

    /// Drop the existing content of `path` ahead of a `Create` write.
    ///
    /// Returns the generation the writer must expect at commit.
    pub(crate) fn supersede(&self, path: &Path) -> StoreResult<Option<u64>> {
        let _g = self.locks.lock(path);
        let Some(old) = self.blocks.read_descriptor(path)? else {
            return Ok(None);
        };
        if old.is_directory() {
            return Err(StoreError::InvalidState(format!(
                "{path} is a directory"
            )));
        }
        let mut d = Descriptor::new_file(self.block_size());
        d.generation = old.generation + 1;
        // Shrink the descriptor before the blocks disappear.
        self.blocks.write_descriptor(path, &d)?;
        if let Err(e) = self.blocks.remove_blocks(path, 0..old.block_count()) {
            warn!("failed to remove superseded blocks of {path}: {e}");
        }
        Ok(Some(d.generation))
    }

    /// Publish `layout` as the new content of `path`.
    ///
    /// Every block in `layout` except `pending` must already be written;
    /// `pending` is written only once the generation check has passed. Returns
    /// the new generation.
    pub(crate) fn commit(
        &self,
        path: &Path,
        layout: &BlockLayout,
        expected: Option<u64>,
        pending: Option<(u32, &[u8])>,
    ) -> StoreResult<u64> {
        let generation = {
            let _g = self.locks.lock(path);
            let current = self.blocks.read_descriptor(path)?;
            let actual = current.as_ref().map(|d| d.generation);
            if actual != expected {
                return Err(StoreError::ConcurrentModification {
                    path: path.to_string(),
                    expected: expected.unwrap_or(0),
                    actual: actual.unwrap_or(0),
                });
            }
            if let Some((index, data)) = pending {
                self.blocks.write_block(path, index, data)?;
            }
            let d = Descriptor {
                kind: EntryKind::File,
                layout: layout.clone(),
                last_modified_ms: now_millis(),
                generation: actual.map_or_else(fresh_generation, |g| g + 1),
                children: Default::default(),
            };
            self.blocks.write_descriptor(path, &d)?;
            d.generation
        };
        if expected.is_none() {
            if let Some(parent) = path.parent(true) {
                self.ensure_dir(&parent)?;
                self.add_child(&parent, path.leaf())?;
            }
        }
        Ok(generation)
    }

    fn descriptor(&self, path: &Path) -> StoreResult<Descriptor> {
        self.blocks
            .read_descriptor(path)?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn delete(&self, path: &Path) -> StoreResult<bool> {
        let Some(d) = self.blocks.read_descriptor(path)? else {
            return Ok(false);
        };
        if d.is_directory() {
            for leaf in &d.children {
                self.delete(&path.join(leaf)?)?;
            }
        }
        {
            let _g = self.locks.lock(path);
            let Some(d) = self.blocks.read_descriptor(path)? else {
                return Ok(false);
            };
            self.blocks.remove_descriptor(path)?;
            self.blocks.remove_blocks(path, 0..d.block_count())?;
        }
        self.metrics.file_deleted();
        if let Some(parent) = path.parent(true) {
            self.remove_child(&parent, path.leaf())?;
        }
        Ok(true)
    }
}

/// Search-index directory over a column store.
#[derive(Clone)]
pub struct BlockDirectory {
    inner: Arc<DirectoryInner>,
}

impl BlockDirectory {
    /// Open the directory rooted at `root` in `store`.
    ///
    /// The block access strategy is chosen from `config.kind`; the root (and its
    /// ancestors) are created as directory entries if missing.
    pub fn open(
        store: Arc<dyn ColumnStore>,
        root: &str,
        config: DirectoryConfig,
        metrics: Arc<StoreMetrics>,
    ) -> StoreResult<Self> {
        config.validate()?;
        let root = Path::new(root)?;
        let blocks = config.kind.build(store, &config.scope, metrics.clone())?;
        let inner = DirectoryInner {
            root,
            config,
            blocks,
            metrics,
            locks: PathLocks::new(),
            closed: AtomicBool::new(false),
        };
        inner.ensure_dir(&inner.root)?;
        debug!(
            "opened directory {} in scope {:?} ({:?}, block_size={})",
            inner.root, inner.config.scope, inner.config.kind, inner.config.block_size
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Open with default configuration and a private metrics context.
    pub fn open_default(store: Arc<dyn ColumnStore>, root: &str) -> StoreResult<Self> {
        Self::open(
            store,
            root,
            DirectoryConfig::default(),
            Arc::new(StoreMetrics::new()),
        )
    }

    /// Root path this directory is scoped to.
    pub fn directory(&self) -> &Path {
        &self.inner.root
    }

    /// Configuration the directory was opened with.
    pub fn config(&self) -> &DirectoryConfig {
        &self.inner.config
    }

    /// Current counter values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Resolve `name` against the root.
    ///
    /// A name that resolves to the root itself (`"/"`, `"//"`) is `InvalidPath`.
    pub fn resolve(&self, name: &str) -> StoreResult<Path> {
        let path = Path::resolve(&self.inner.root, name)?;
        if path == self.inner.root {
            return Err(StoreError::InvalidPath(format!(
                "{name:?} names the directory root"
            )));
        }
        Ok(path)
    }

    /// Names of every direct child of the root, in order.
    pub fn list_all(&self) -> StoreResult<Vec<String>> {
        self.inner.check_open()?;
        let d = self.inner.descriptor(&self.inner.root)?;
        Ok(d.children.into_iter().collect())
    }

    /// Direct children of `name` (the root when `None`) accepted by `filter`.
    ///
    /// A file has no children. A missing path is `NotFound`.
    pub fn list_files(
        &self,
        name: Option<&str>,
        filter: Option<&dyn Fn(&FileEntry) -> bool>,
    ) -> StoreResult<Vec<FileEntry>> {
        self.inner.check_open()?;
        let dir = match name {
            Some(n) => self.resolve(n)?,
            None => self.inner.root.clone(),
        };
        let d = self.inner.descriptor(&dir)?;
        let mut out = Vec::new();
        for leaf in &d.children {
            let path = dir.join(leaf)?;
            // Point-in-time listing: a child deleted since we read the parent is skipped.
            let Some(cd) = self.inner.blocks.read_descriptor(&path)? else {
                continue;
            };
            let entry = FileEntry {
                path,
                kind: cd.kind,
                length: cd.length(),
                last_modified_ms: cd.last_modified_ms,
            };
            if filter.is_none_or(|f| f(&entry)) {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Whether `name` has a descriptor.
    pub fn file_exists(&self, name: &str) -> StoreResult<bool> {
        self.inner.check_open()?;
        let path = self.resolve(name)?;
        Ok(self.inner.blocks.read_descriptor(&path)?.is_some())
    }

    /// Descriptor length of `name`.
    pub fn file_length(&self, name: &str) -> StoreResult<u64> {
        self.inner.check_open()?;
        Ok(self.inner.descriptor(&self.resolve(name)?)?.length())
    }

    /// Descriptor timestamp of `name` (milliseconds since the Unix epoch).
    pub fn file_modified(&self, name: &str) -> StoreResult<u64> {
        self.inner.check_open()?;
        Ok(self
            .inner
            .descriptor(&self.resolve(name)?)?
            .last_modified_ms)
    }

    /// Open `name` for writing, superseding any existing content on first write.
    pub fn create_output(&self, name: &str, context: IoContext) -> StoreResult<FileHandle> {
        self.open_in(name, OpenMode::Create, context)
    }

    /// Open `name` for writing after its existing blocks.
    pub fn append_output(&self, name: &str) -> StoreResult<FileHandle> {
        self.open_handle(name, OpenMode::CreateOrAppend)
    }

    /// Open `name` read-only; `NotFound` if it has no descriptor.
    pub fn open_input(&self, name: &str, context: IoContext) -> StoreResult<FileHandle> {
        self.open_in(name, OpenMode::Read, context)
    }

    /// Open `name` in `mode`.
    pub fn open_handle(&self, name: &str, mode: OpenMode) -> StoreResult<FileHandle> {
        self.open_in(name, mode, IoContext::Default)
    }

    fn open_in(&self, name: &str, mode: OpenMode, context: IoContext) -> StoreResult<FileHandle> {
        self.inner.check_open()?;
        if mode.is_write() {
            self.ensure_can_write(name)?;
        }
        let path = self.resolve(name)?;
        FileHandle::open(self.inner.clone(), path, mode, context)
    }

    /// Bounded random-access views over `name`, as committed right now.
    pub fn create_slicer(&self, name: &str, context: IoContext) -> StoreResult<Slicer> {
        self.inner.check_open()?;
        let path = self.resolve(name)?;
        let d = self.inner.descriptor(&path)?;
        if d.is_directory() {
            return Err(StoreError::InvalidState(format!("{path} is a directory")));
        }
        debug!("slicing {path} ({context:?}, generation {})", d.generation);
        Ok(Slicer::new(self.inner.clone(), path, d.layout, d.generation))
    }

    /// Remove `name` (recursively for directories). Missing paths are not an error.
    pub fn delete_file(&self, name: &str) -> StoreResult<()> {
        self.inner.check_open()?;
        let path = self.resolve(name)?;
        if self.inner.delete(&path)? {
            debug!("deleted {path}");
        } else {
            debug!("delete of missing {path} ignored");
        }
        Ok(())
    }

    /// Make sure every ancestor of `name` exists as a directory.
    ///
    /// Does not create `name` itself.
    pub fn ensure_can_write(&self, name: &str) -> StoreResult<()> {
        self.inner.check_open()?;
        let path = self.resolve(name)?;
        match path.parent(true) {
            Some(parent) => self.inner.ensure_dir(&parent),
            None => Err(StoreError::InvalidPath("cannot write to the root".into())),
        }
    }

    /// Create `name` as an (empty) directory.
    pub fn create_directory(&self, name: &str) -> StoreResult<()> {
        self.inner.check_open()?;
        self.inner.ensure_dir(&self.resolve(name)?)
    }

    /// Ask the store to make `names` durable (see [`SyncPolicy`]).
    pub fn sync(&self, names: &[&str]) -> StoreResult<()> {
        self.inner.check_open()?;
        if self.inner.config.sync == SyncPolicy::Skip {
            return Ok(());
        }
        let rows = names
            .iter()
            .map(|n| self.resolve(n).map(|p| p.row_key().to_string()))
            .collect::<StoreResult<Vec<_>>>()?;
        self.inner.blocks.sync(&rows)
    }

    /// Lock token for the root path: `"lucene-"` followed by 8 hex digits.
    ///
    /// Deterministic per canonical root; locking itself is up to the caller.
    pub fn lock_id(&self) -> String {
        format!(
            "lucene-{:08x}",
            crc32fast::hash(self.inner.root.name().as_bytes())
        )
    }

    /// Every row in scope that carries a descriptor (not limited to this root).
    pub fn scan_rows(&self, limit: usize) -> StoreResult<Vec<String>> {
        self.inner.check_open()?;
        self.inner.blocks.scan(limit)
    }

    /// Drop every row in scope, then recreate the root. Maintenance/test use only.
    pub fn truncate_scope(&self) -> StoreResult<()> {
        self.inner.check_open()?;
        warn!("truncating scope {:?}", self.inner.config.scope);
        self.inner.blocks.truncate()?;
        self.inner.ensure_dir(&self.inner.root)
    }

    /// Close the directory. Handles and slices opened from it fail afterwards.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!("closed directory {}", self.inner.root);
        }
    }

    /// Whether [`BlockDirectory::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for BlockDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockDirectory")
            .field("root", &self.inner.root)
            .field("scope", &self.inner.config.scope)
            .finish()
    }
}
