//! Counters for one directory (or a group of directories sharing a context).
//!
//! A `StoreMetrics` is constructed by the caller and handed to
//! [`crate::BlockDirectory::open`]; nothing in this crate keeps a global registry.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counter(AtomicU64);

impl Counter {
    fn add(&self, delta: u64) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_add(delta))
            });
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Storage counters.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    blocks_read: Counter,
    blocks_written: Counter,
    bytes_read: Counter,
    bytes_written: Counter,
    descriptors_written: Counter,
    files_deleted: Counter,
    cache_hits: Counter,
    cache_misses: Counter,
}

/// Point-in-time copy of [`StoreMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Blocks fetched from the store.
    pub blocks_read: u64,
    /// Blocks written to the store.
    pub blocks_written: u64,
    /// Payload bytes fetched.
    pub bytes_read: u64,
    /// Payload bytes written.
    pub bytes_written: u64,
    /// Descriptor commits (files and directories).
    pub descriptors_written: u64,
    /// Paths removed by `delete_file`, children included.
    pub files_deleted: u64,
    /// Block reads served by the cache.
    pub cache_hits: u64,
    /// Block reads the cache had to forward.
    pub cache_misses: u64,
}

impl StoreMetrics {
    /// Fresh, zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn block_read(&self, bytes: usize) {
        self.blocks_read.add(1);
        self.bytes_read.add(bytes as u64);
    }

    pub(crate) fn block_written(&self, bytes: usize) {
        self.blocks_written.add(1);
        self.bytes_written.add(bytes as u64);
    }

    pub(crate) fn descriptor_written(&self) {
        self.descriptors_written.add(1);
    }

    pub(crate) fn file_deleted(&self) {
        self.files_deleted.add(1);
    }

    pub(crate) fn cache_hit(&self) {
        self.cache_hits.add(1);
    }

    pub(crate) fn cache_miss(&self) {
        self.cache_misses.add(1);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_read: self.blocks_read.get(),
            blocks_written: self.blocks_written.get(),
            bytes_read: self.bytes_read.get(),
            bytes_written: self.bytes_written.get(),
            descriptors_written: self.descriptors_written.get(),
            files_deleted: self.files_deleted.get(),
            cache_hits: self.cache_hits.get(),
            cache_misses: self.cache_misses.get(),
        }
    }
}
