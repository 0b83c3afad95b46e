//! Block and descriptor access against a [`ColumnStore`].
//!
//! [`BlockAccess`] is the strategy a directory is opened with. [`SimpleBlocks`]
//! goes straight to the store; [`CachedBlocks`] keeps recently read blocks in an
//! LRU.

use crate::descriptor::Descriptor;
use crate::error::{StoreError, StoreResult};
use crate::formats::{block_column, DESCRIPTOR_COLUMN};
use crate::metrics::StoreMetrics;
use crate::path::Path;
use crate::store::ColumnStore;
use log::trace;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;

/// Row-level operations the file layer is built on.
pub trait BlockAccess: Send + Sync {
    /// Payload of block `index` of `path`; `NotFound` if the column is absent.
    ///
    /// `generation` is the descriptor generation the caller read its layout
    /// from. Blocks are only reused for the same generation.
    fn read_block(&self, path: &Path, generation: u64, index: u32) -> StoreResult<Arc<Vec<u8>>>;
    /// Write block `index` of `path`.
    fn write_block(&self, path: &Path, index: u32, data: &[u8]) -> StoreResult<()>;
    /// Remove blocks `indices` of `path` (absent blocks are ignored).
    fn remove_blocks(&self, path: &Path, indices: Range<u32>) -> StoreResult<()>;
    /// The descriptor of `path`, if any.
    fn read_descriptor(&self, path: &Path) -> StoreResult<Option<Descriptor>>;
    /// Replace the descriptor of `path`.
    fn write_descriptor(&self, path: &Path, d: &Descriptor) -> StoreResult<()>;
    /// Remove the descriptor of `path`.
    fn remove_descriptor(&self, path: &Path) -> StoreResult<()>;
    /// Row keys in scope that carry a descriptor.
    fn scan(&self, limit: usize) -> StoreResult<Vec<String>>;
    /// Ask the store to make `rows` durable.
    fn sync(&self, rows: &[String]) -> StoreResult<()>;
    /// Drop everything in scope.
    fn truncate(&self) -> StoreResult<()>;
}

/// Direct store access.
pub struct SimpleBlocks {
    store: Arc<dyn ColumnStore>,
    scope: String,
    metrics: Arc<StoreMetrics>,
}

impl SimpleBlocks {
    /// Address `scope` in `store`.
    pub fn new(
        store: Arc<dyn ColumnStore>,
        scope: impl Into<String>,
        metrics: Arc<StoreMetrics>,
    ) -> Self {
        Self {
            store,
            scope: scope.into(),
            metrics,
        }
    }
}

impl BlockAccess for SimpleBlocks {
    fn read_block(&self, path: &Path, _generation: u64, index: u32) -> StoreResult<Arc<Vec<u8>>> {
        let data = self
            .store
            .get_column(&self.scope, path.row_key(), &block_column(index))?
            .ok_or_else(|| StoreError::NotFound(format!("{path} block {index}")))?;
        self.metrics.block_read(data.len());
        Ok(Arc::new(data))
    }

    fn write_block(&self, path: &Path, index: u32, data: &[u8]) -> StoreResult<()> {
        self.store
            .put_column(&self.scope, path.row_key(), &block_column(index), data)?;
        self.metrics.block_written(data.len());
        trace!("wrote {path} block {index} ({} bytes)", data.len());
        Ok(())
    }

    fn remove_blocks(&self, path: &Path, indices: Range<u32>) -> StoreResult<()> {
        if indices.is_empty() {
            return Ok(());
        }
        let columns: Vec<String> = indices.map(block_column).collect();
        self.store
            .remove_columns(&self.scope, path.row_key(), &columns)
    }

    fn read_descriptor(&self, path: &Path) -> StoreResult<Option<Descriptor>> {
        match self
            .store
            .get_column(&self.scope, path.row_key(), DESCRIPTOR_COLUMN)?
        {
            Some(bytes) => Ok(Some(Descriptor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_descriptor(&self, path: &Path, d: &Descriptor) -> StoreResult<()> {
        let bytes = d.encode()?;
        self.store
            .put_column(&self.scope, path.row_key(), DESCRIPTOR_COLUMN, &bytes)?;
        self.metrics.descriptor_written();
        trace!(
            "committed descriptor {path} (generation {}, {} bytes in {} blocks)",
            d.generation,
            d.length(),
            d.block_count()
        );
        Ok(())
    }

    fn remove_descriptor(&self, path: &Path) -> StoreResult<()> {
        self.store.remove_columns(
            &self.scope,
            path.row_key(),
            &[DESCRIPTOR_COLUMN.to_string()],
        )
    }

    fn scan(&self, limit: usize) -> StoreResult<Vec<String>> {
        self.store.get_keys(&self.scope, DESCRIPTOR_COLUMN, limit)
    }

    fn sync(&self, rows: &[String]) -> StoreResult<()> {
        self.store.sync(&self.scope, rows)
    }

    fn truncate(&self) -> StoreResult<()> {
        self.store.truncate(&self.scope)
    }
}

/// Read-through LRU over [`SimpleBlocks`].
///
/// Only block payloads are cached; descriptors always go to the store so that
/// generation checks see other writers' commits. Entries are keyed by
/// `(row, generation, index)`: a reader that opened after a commit asks for the
/// new generation and never sees bytes cached under an older one, whichever
/// directory wrote them.
pub struct CachedBlocks {
    inner: SimpleBlocks,
    cache: Mutex<LruCache<CacheKey, Arc<Vec<u8>>>>,
    metrics: Arc<StoreMetrics>,
}

type CacheKey = (String, u64, u32);

impl CachedBlocks {
    /// Cache up to `capacity_blocks` blocks in front of `inner`.
    pub fn new(inner: SimpleBlocks, capacity_blocks: usize) -> StoreResult<Self> {
        let cap = NonZeroUsize::new(capacity_blocks).ok_or_else(|| {
            StoreError::InvalidConfig("cache capacity_blocks must be > 0".into())
        })?;
        let metrics = inner.metrics.clone();
        Ok(Self {
            inner,
            cache: Mutex::new(LruCache::new(cap)),
            metrics,
        })
    }

    fn invalidate(&self, path: &Path, indices: Option<Range<u32>>) {
        let mut cache = self.cache.lock();
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|((row, _, index), _)| {
                row == path.row_key() && indices.as_ref().is_none_or(|r| r.contains(index))
            })
            .map(|(k, _)| k.clone())
            .collect();
        for k in stale {
            cache.pop(&k);
        }
    }
}

impl BlockAccess for CachedBlocks {
    fn read_block(&self, path: &Path, generation: u64, index: u32) -> StoreResult<Arc<Vec<u8>>> {
        let key = (path.row_key().to_string(), generation, index);
        if let Some(hit) = self.cache.lock().get(&key) {
            self.metrics.cache_hit();
            return Ok(hit.clone());
        }
        self.metrics.cache_miss();
        let data = self.inner.read_block(path, generation, index)?;
        self.cache.lock().put(key, data.clone());
        Ok(data)
    }

    fn write_block(&self, path: &Path, index: u32, data: &[u8]) -> StoreResult<()> {
        // New bytes belong to the next generation; nothing cached can match it.
        self.inner.write_block(path, index, data)
    }

    fn remove_blocks(&self, path: &Path, indices: Range<u32>) -> StoreResult<()> {
        if !indices.is_empty() {
            self.invalidate(path, Some(indices.clone()));
        }
        self.inner.remove_blocks(path, indices)
    }

    fn read_descriptor(&self, path: &Path) -> StoreResult<Option<Descriptor>> {
        self.inner.read_descriptor(path)
    }

    fn write_descriptor(&self, path: &Path, d: &Descriptor) -> StoreResult<()> {
        self.inner.write_descriptor(path, d)
    }

    fn remove_descriptor(&self, path: &Path) -> StoreResult<()> {
        self.invalidate(path, None);
        self.inner.remove_descriptor(path)
    }

    fn scan(&self, limit: usize) -> StoreResult<Vec<String>> {
        self.inner.scan(limit)
    }

    fn sync(&self, rows: &[String]) -> StoreResult<()> {
        self.inner.sync(rows)
    }

    fn truncate(&self) -> StoreResult<()> {
        self.cache.lock().clear();
        self.inner.truncate()
    }
}
