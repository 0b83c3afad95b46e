//! `ColumnStore` wrapper with targeted fault injection.
//!
//! Lives under `tests/support/` so it is not compiled as a standalone
//! integration test target.

use blockdir::formats::{parse_block_column, DESCRIPTOR_COLUMN};
use blockdir::store::{ColumnStore, MemoryStore};
use blockdir::{StoreError, StoreResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Fault-injection switches and counters.
#[derive(Default)]
pub struct FaultConfig {
    /// Fail every block put once this many block puts have succeeded.
    pub fail_block_put_after: Option<usize>,
    /// Fail descriptor puts for file rows (directories are left alone).
    pub fail_file_descriptor_put: bool,
    /// Fail removal of block columns.
    pub fail_block_remove: bool,
    /// Block puts that succeeded.
    pub block_puts: usize,
    /// Removal calls that touched block columns.
    pub block_remove_calls: usize,
}

/// An in-memory `ColumnStore` that fails on command.
pub struct FaultyStore {
    inner: MemoryStore,
    cfg: Arc<Mutex<FaultConfig>>,
}

impl FaultyStore {
    /// Wrap an existing `MemoryStore`.
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            cfg: Arc::new(Mutex::new(FaultConfig::default())),
        }
    }

    /// Shared fault config (for toggling failpoints and reading counters).
    pub fn cfg(&self) -> Arc<Mutex<FaultConfig>> {
        self.cfg.clone()
    }

    /// The wrapped store, for inspecting raw rows.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Backing(format!("injected {what} failure"))
    }

    fn is_file_row(&self, scope: &str, row: &str) -> StoreResult<bool> {
        let existing = self.inner.get_column(scope, row, DESCRIPTOR_COLUMN)?;
        // New rows reach the store as files first; directories already exist
        // by the time a file descriptor is written under them.
        Ok(match existing {
            None => true,
            Some(bytes) => blockdir::descriptor::Descriptor::decode(&bytes)
                .map(|d| !d.is_directory())
                .unwrap_or(true),
        })
    }
}

impl ColumnStore for FaultyStore {
    fn get_column(&self, scope: &str, row: &str, column: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get_column(scope, row, column)
    }

    fn get_columns(
        &self,
        scope: &str,
        row: &str,
        columns: Option<&[String]>,
    ) -> StoreResult<BTreeMap<String, Vec<u8>>> {
        self.inner.get_columns(scope, row, columns)
    }

    fn put_column(&self, scope: &str, row: &str, column: &str, value: &[u8]) -> StoreResult<()> {
        let mut cfg = self.cfg.lock().unwrap();
        if parse_block_column(column).is_some() {
            if cfg
                .fail_block_put_after
                .is_some_and(|n| cfg.block_puts >= n)
            {
                return Err(Self::injected("block put"));
            }
            cfg.block_puts += 1;
        } else if column == DESCRIPTOR_COLUMN
            && cfg.fail_file_descriptor_put
            && self.is_file_row(scope, row)?
        {
            return Err(Self::injected("descriptor put"));
        }
        drop(cfg);
        self.inner.put_column(scope, row, column, value)
    }

    fn remove_columns(&self, scope: &str, row: &str, columns: &[String]) -> StoreResult<()> {
        let mut cfg = self.cfg.lock().unwrap();
        if columns.iter().any(|c| parse_block_column(c).is_some()) {
            cfg.block_remove_calls += 1;
            if cfg.fail_block_remove {
                return Err(Self::injected("block remove"));
            }
        }
        drop(cfg);
        self.inner.remove_columns(scope, row, columns)
    }

    fn get_keys(&self, scope: &str, column: &str, limit: usize) -> StoreResult<Vec<String>> {
        self.inner.get_keys(scope, column, limit)
    }

    fn truncate(&self, scope: &str) -> StoreResult<()> {
        self.inner.truncate(scope)
    }
}
