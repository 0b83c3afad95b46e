//! Backing column-store interface.
//!
//! The block layer only needs a handful of row/column operations. Everything
//! else (replication, consistency, connection handling) belongs to the store.
//!
//! Vocabulary note:
//! - `put_column` is a **visibility boundary**: a successful put is readable by
//!   subsequent `get_column` calls from any handle.
//! - Stable-storage durability is the store's business; [`ColumnStore::sync`] is
//!   the hook for backends that need an explicit barrier.

use crate::error::{StoreError, StoreResult};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Row/column operations the block layer requires.
///
/// `scope` names the keyspace/table all rows live in.
pub trait ColumnStore: Send + Sync {
    /// Fetch one column value.
    fn get_column(&self, scope: &str, row: &str, column: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Fetch several columns of one row, ordered by column key.
    ///
    /// `columns == None` fetches every column of the row. Missing columns are
    /// simply absent from the result.
    fn get_columns(
        &self,
        scope: &str,
        row: &str,
        columns: Option<&[String]>,
    ) -> StoreResult<BTreeMap<String, Vec<u8>>>;

    /// Write (insert or overwrite) one column value.
    fn put_column(&self, scope: &str, row: &str, column: &str, value: &[u8]) -> StoreResult<()>;

    /// Remove columns from a row. Missing columns are ignored; a row left
    /// without columns disappears.
    fn remove_columns(&self, scope: &str, row: &str, columns: &[String]) -> StoreResult<()>;

    /// Row keys that carry `column`, in key order, at most `limit` of them.
    fn get_keys(&self, scope: &str, column: &str, limit: usize) -> StoreResult<Vec<String>>;

    /// Drop every row in `scope`.
    fn truncate(&self, scope: &str) -> StoreResult<()>;

    /// Make the given rows durable. Stores that are durable per write keep the
    /// default no-op.
    fn sync(&self, _scope: &str, _rows: &[String]) -> StoreResult<()> {
        Ok(())
    }
}

type Rows = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// In-memory `ColumnStore`, used for tests and embedded use.
#[derive(Clone, Default)]
pub struct MemoryStore {
    scopes: Arc<RwLock<HashMap<String, Rows>>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `scope`.
    pub fn row_count(&self, scope: &str) -> StoreResult<usize> {
        let scopes = self
            .scopes
            .read()
            .map_err(|_| StoreError::poisoned("memory store"))?;
        Ok(scopes.get(scope).map_or(0, |rows| rows.len()))
    }
}

impl ColumnStore for MemoryStore {
    fn get_column(&self, scope: &str, row: &str, column: &str) -> StoreResult<Option<Vec<u8>>> {
        let scopes = self
            .scopes
            .read()
            .map_err(|_| StoreError::poisoned("memory store"))?;
        Ok(scopes
            .get(scope)
            .and_then(|rows| rows.get(row))
            .and_then(|cols| cols.get(column))
            .cloned())
    }

    fn get_columns(
        &self,
        scope: &str,
        row: &str,
        columns: Option<&[String]>,
    ) -> StoreResult<BTreeMap<String, Vec<u8>>> {
        let scopes = self
            .scopes
            .read()
            .map_err(|_| StoreError::poisoned("memory store"))?;
        let Some(cols) = scopes.get(scope).and_then(|rows| rows.get(row)) else {
            return Ok(BTreeMap::new());
        };
        Ok(match columns {
            None => cols.clone(),
            Some(wanted) => wanted
                .iter()
                .filter_map(|c| cols.get(c).map(|v| (c.clone(), v.clone())))
                .collect(),
        })
    }

    fn put_column(&self, scope: &str, row: &str, column: &str, value: &[u8]) -> StoreResult<()> {
        self.scopes
            .write()
            .map_err(|_| StoreError::poisoned("memory store"))?
            .entry(scope.to_string())
            .or_default()
            .entry(row.to_string())
            .or_default()
            .insert(column.to_string(), value.to_vec());
        Ok(())
    }

    fn remove_columns(&self, scope: &str, row: &str, columns: &[String]) -> StoreResult<()> {
        let mut scopes = self
            .scopes
            .write()
            .map_err(|_| StoreError::poisoned("memory store"))?;
        let Some(rows) = scopes.get_mut(scope) else {
            return Ok(());
        };
        if let Some(cols) = rows.get_mut(row) {
            for c in columns {
                cols.remove(c);
            }
            if cols.is_empty() {
                rows.remove(row);
            }
        }
        Ok(())
    }

    fn get_keys(&self, scope: &str, column: &str, limit: usize) -> StoreResult<Vec<String>> {
        let scopes = self
            .scopes
            .read()
            .map_err(|_| StoreError::poisoned("memory store"))?;
        Ok(scopes
            .get(scope)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, cols)| cols.contains_key(column))
                    .map(|(k, _)| k.clone())
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn truncate(&self, scope: &str) -> StoreResult<()> {
        self.scopes
            .write()
            .map_err(|_| StoreError::poisoned("memory store"))?
            .remove(scope);
        Ok(())
    }
}

/// Filesystem-backed `ColumnStore` rooted at a local path.
///
/// Layout: `<root>/<scope>/<hex(row key)>/<column>`. Column writes go through a
/// temp file and an atomic rename, so a reader never observes a torn value.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create (or open) a filesystem store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn scope_dir(&self, scope: &str) -> StoreResult<PathBuf> {
        if scope.is_empty() || scope.contains(['/', '\\']) || scope.starts_with('.') {
            return Err(StoreError::InvalidConfig(format!(
                "scope is not a plain name: {scope:?}"
            )));
        }
        Ok(self.root.join(scope))
    }

    fn row_dir(&self, scope: &str, row: &str) -> StoreResult<PathBuf> {
        Ok(self.scope_dir(scope)?.join(hex::encode(row.as_bytes())))
    }

    fn column_file(&self, scope: &str, row: &str, column: &str) -> StoreResult<PathBuf> {
        if column.is_empty() || column.contains(['/', '\\']) || column.starts_with('.') {
            return Err(StoreError::InvalidConfig(format!(
                "column is not a plain name: {column:?}"
            )));
        }
        Ok(self.row_dir(scope, row)?.join(column))
    }

    /// Optional filesystem path of a column, for tests that corrupt bytes on disk.
    pub fn column_path(&self, scope: &str, row: &str, column: &str) -> Option<PathBuf> {
        self.column_file(scope, row, column).ok()
    }
}

fn read_if_exists(p: &std::path::Path) -> StoreResult<Option<Vec<u8>>> {
    match std::fs::read(p) {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl ColumnStore for FsStore {
    fn get_column(&self, scope: &str, row: &str, column: &str) -> StoreResult<Option<Vec<u8>>> {
        read_if_exists(&self.column_file(scope, row, column)?)
    }

    fn get_columns(
        &self,
        scope: &str,
        row: &str,
        columns: Option<&[String]>,
    ) -> StoreResult<BTreeMap<String, Vec<u8>>> {
        let mut out = BTreeMap::new();
        if let Some(wanted) = columns {
            for c in wanted {
                if let Some(v) = self.get_column(scope, row, c)? {
                    out.insert(c.clone(), v);
                }
            }
            return Ok(out);
        }
        let dir = self.row_dir(scope, row)?;
        if !dir.exists() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".tmp") {
                continue;
            }
            if let Some(v) = read_if_exists(&entry.path())? {
                out.insert(name, v);
            }
        }
        Ok(out)
    }

    fn put_column(&self, scope: &str, row: &str, column: &str, value: &[u8]) -> StoreResult<()> {
        let full_path = self.column_file(scope, row, column)?;
        let dir = self.row_dir(scope, row)?;
        std::fs::create_dir_all(&dir)?;
        // Unique per writer: two puts of one column never share a temp file.
        let mut temp_file = tempfile::Builder::new()
            .prefix(column)
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        temp_file.write_all(value)?;
        temp_file.flush()?;
        temp_file.persist(&full_path).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove_columns(&self, scope: &str, row: &str, columns: &[String]) -> StoreResult<()> {
        for c in columns {
            let p = self.column_file(scope, row, c)?;
            match std::fs::remove_file(&p) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let dir = self.row_dir(scope, row)?;
        if dir.exists() && std::fs::read_dir(&dir)?.next().is_none() {
            std::fs::remove_dir(&dir)?;
        }
        Ok(())
    }

    fn get_keys(&self, scope: &str, column: &str, limit: usize) -> StoreResult<Vec<String>> {
        let dir = self.scope_dir(scope)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(raw) = hex::decode(&name) else {
                continue;
            };
            let Ok(key) = String::from_utf8(raw) else {
                continue;
            };
            if entry.path().join(column).exists() {
                keys.push(key);
            }
        }
        keys.sort();
        keys.truncate(limit);
        Ok(keys)
    }

    fn truncate(&self, scope: &str) -> StoreResult<()> {
        let dir = self.scope_dir(scope)?;
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn sync(&self, scope: &str, rows: &[String]) -> StoreResult<()> {
        for row in rows {
            let dir = self.row_dir(scope, row)?;
            if !dir.exists() {
                continue;
            }
            for entry in std::fs::read_dir(&dir)? {
                let f = std::fs::OpenOptions::new().read(true).open(entry?.path())?;
                f.sync_all()?;
            }
            // Names are only durable once the containing directory is synced.
            std::fs::File::open(&dir)?.sync_all()?;
        }
        if let Ok(scope_dir) = self.scope_dir(scope) {
            if scope_dir.exists() {
                std::fs::File::open(&scope_dir)?.sync_all()?;
            }
        }
        Ok(())
    }
}
