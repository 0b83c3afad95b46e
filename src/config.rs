//! Directory configuration.

use crate::blocks::{BlockAccess, CachedBlocks, SimpleBlocks};
use crate::error::{StoreError, StoreResult};
use crate::metrics::StoreMetrics;
use crate::store::ColumnStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default block size (16 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024;
/// Default storage scope.
pub const DEFAULT_SCOPE: &str = "lucene";

/// Which block access strategy a directory is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryKind {
    /// Every block read goes to the store.
    Simple,
    /// Keep up to `capacity_blocks` recently used blocks in memory.
    Cached {
        /// Maximum number of cached blocks.
        capacity_blocks: usize,
    },
}

impl DirectoryKind {
    /// Build the strategy for `scope` in `store`.
    pub fn build(
        &self,
        store: Arc<dyn ColumnStore>,
        scope: &str,
        metrics: Arc<StoreMetrics>,
    ) -> StoreResult<Arc<dyn BlockAccess>> {
        let simple = SimpleBlocks::new(store, scope, metrics);
        Ok(match self {
            DirectoryKind::Simple => Arc::new(simple),
            DirectoryKind::Cached { capacity_blocks } => {
                Arc::new(CachedBlocks::new(simple, *capacity_blocks)?)
            }
        })
    }
}

/// What `sync` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Delegate to [`ColumnStore::sync`].
    StoreDefault,
    /// Do nothing (store is durable per column write).
    Skip,
}

/// Options for [`crate::BlockDirectory::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Storage scope (keyspace/table equivalent).
    pub scope: String,
    /// Maximum payload bytes per block column.
    pub block_size: usize,
    /// Block access strategy.
    pub kind: DirectoryKind,
    /// Sync behaviour.
    pub sync: SyncPolicy,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            scope: DEFAULT_SCOPE.to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            kind: DirectoryKind::Simple,
            sync: SyncPolicy::StoreDefault,
        }
    }
}

impl DirectoryConfig {
    /// Defaults with an explicit scope.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    /// Set the block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Use a block cache of `capacity_blocks` entries.
    pub fn with_cache(mut self, capacity_blocks: usize) -> Self {
        self.kind = DirectoryKind::Cached { capacity_blocks };
        self
    }

    /// Set the sync policy.
    pub fn with_sync_policy(mut self, sync: SyncPolicy) -> Self {
        self.sync = sync;
        self
    }

    /// Reject configurations the block layer cannot work with.
    pub fn validate(&self) -> StoreResult<()> {
        if self.scope.trim().is_empty() {
            return Err(StoreError::InvalidConfig("scope must not be empty".into()));
        }
        if self.block_size == 0 {
            return Err(StoreError::InvalidConfig("block_size must be > 0".into()));
        }
        if u32::try_from(self.block_size).is_err() {
            return Err(StoreError::InvalidConfig(format!(
                "block_size too large: {}",
                self.block_size
            )));
        }
        if let DirectoryKind::Cached { capacity_blocks: 0 } = self.kind {
            return Err(StoreError::InvalidConfig(
                "cache capacity_blocks must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        DirectoryConfig::default().validate().unwrap();
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(DirectoryConfig::new("").validate().is_err());
        assert!(DirectoryConfig::default()
            .with_block_size(0)
            .validate()
            .is_err());
        assert!(DirectoryConfig::default().with_cache(0).validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: DirectoryConfig = serde_json::from_str(
            r#"{"scope":"idx","kind":{"type":"cached","capacity_blocks":64}}"#,
        )
        .unwrap();
        assert_eq!(cfg.scope, "idx");
        assert_eq!(cfg.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(cfg.kind, DirectoryKind::Cached { capacity_blocks: 64 });
        assert_eq!(cfg.sync, SyncPolicy::StoreDefault);
    }
}
