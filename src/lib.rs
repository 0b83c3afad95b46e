//! `blockdir`: block-chunked virtual files and search-index directories over a
//! column-oriented key-value store.
//!
//! Scope:
//! - backing store interface (`store`), with in-memory and filesystem stores
//! - on-store framing constants (`formats`) and file descriptors (`descriptor`)
//! - offset/block arithmetic (`codec`)
//! - block access strategies, plain or LRU-cached (`blocks`)
//! - the directory contract consumed by an indexing engine (`directory`)
//! - sequential handles, streams and bounded random-access slices
//!   (`handle`, `stream`, `slicer`)
//! - single-blob state files (`state`)
//!
//! Non-goal: replication, consistency levels, connection pooling. Those are the
//! store's business.
//!
//! ## Storage model
//!
//! Every file or directory is one row whose key is its canonical path. The
//! reserved `DESCRIPTOR` column holds the entry's metadata; file content lives
//! in columns `BLOCK-0`, `BLOCK-1`, ... each at most `block_size` bytes.
//!
//! ## Contract (what you can rely on)
//!
//! - **Descriptor-last publish**: blocks are written before the descriptor that
//!   references them, so a reader never sees a length longer than the data.
//! - **Integrity-checked metadata**: descriptors carry magic, version and CRC;
//!   corruption is reported, never papered over.
//! - **Lost-update detection**: two writers racing on one path cannot both
//!   commit; the loser gets `ConcurrentModification`.
//!
//! Terminology:
//! - `flush()` is a **visibility boundary**: committed bytes are readable by
//!   every handle afterwards.
//! - `sync()` asks the store for stable storage; what that means is up to it.

pub mod blocks;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod directory;
pub mod error;
pub mod formats;
pub mod handle;
pub mod metrics;
pub mod path;
pub mod slicer;
pub mod state;
pub mod store;
pub mod stream;

pub use config::{DirectoryConfig, DirectoryKind, SyncPolicy};
pub use directory::{BlockDirectory, FileEntry};
pub use error::{StoreError, StoreResult};
pub use handle::{FileHandle, IoContext, OpenMode};
pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use path::Path;
pub use slicer::{SliceReader, Slicer};
pub use state::StateFile;
pub use store::{ColumnStore, FsStore, MemoryStore};
pub use stream::{BlockInputStream, BlockOutputStream};
