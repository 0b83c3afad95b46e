//! `ColumnStore` wrapper that can hold one read open mid-flight.
//!
//! `arm(row, column)` makes the next `get_column` of that cell fetch its value,
//! report that it got there, and then wait for `release()` before returning.

use blockdir::store::{ColumnStore, MemoryStore};
use blockdir::StoreResult;
use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

struct Armed {
    row: String,
    column: String,
    reached: Sender<()>,
    release: Receiver<()>,
}

/// Test side of an armed gate.
pub struct Gate {
    reached: Receiver<()>,
    release: Sender<()>,
}

impl Gate {
    /// Block until the gated read has fetched its value.
    pub fn wait_reached(&self) {
        self.reached.recv().unwrap();
    }

    /// Let the gated read return.
    pub fn release(&self) {
        self.release.send(()).unwrap();
    }
}

/// An in-memory `ColumnStore` with one optional read gate.
#[derive(Default)]
pub struct GatedStore {
    inner: MemoryStore,
    armed: Mutex<Option<Armed>>,
}

impl GatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate the next read of `row`/`column`.
    pub fn arm(&self, row: &str, column: &str) -> Gate {
        let (reached_tx, reached_rx) = channel();
        let (release_tx, release_rx) = channel();
        *self.armed.lock().unwrap() = Some(Armed {
            row: row.to_string(),
            column: column.to_string(),
            reached: reached_tx,
            release: release_rx,
        });
        Gate {
            reached: reached_rx,
            release: release_tx,
        }
    }
}

impl ColumnStore for GatedStore {
    fn get_column(&self, scope: &str, row: &str, column: &str) -> StoreResult<Option<Vec<u8>>> {
        let value = self.inner.get_column(scope, row, column)?;
        let hit = {
            let mut armed = self.armed.lock().unwrap();
            match armed.as_ref() {
                Some(a) if a.row == row && a.column == column => armed.take(),
                _ => None,
            }
        };
        if let Some(a) = hit {
            a.reached.send(()).unwrap();
            a.release.recv().unwrap();
        }
        Ok(value)
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
        self.inner.put_column(scope, row, column, value)
    }

    fn remove_columns(&self, scope: &str, row: &str, columns: &[String]) -> StoreResult<()> {
        self.inner.remove_columns(scope, row, columns)
    }

    fn get_keys(&self, scope: &str, column: &str, limit: usize) -> StoreResult<Vec<String>> {
        self.inner.get_keys(scope, column, limit)
    }

    fn truncate(&self, scope: &str) -> StoreResult<()> {
        self.inner.truncate(scope)
    }
}
