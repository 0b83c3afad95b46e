//! Error types for `blockdir`.

/// Result type for block directory operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the `blockdir` crate.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A path string could not be turned into a canonical path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No descriptor (or block) exists for the requested path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation on a handle (or directory) that was already closed.
    #[error("handle closed: {0}")]
    ClosedHandle(String),

    /// A read or window falls outside the bytes it is allowed to address.
    #[error("{what} out of bounds: offset={offset} length={length} limit={limit}")]
    OutOfBounds {
        /// What was being addressed (slice description, file path, ...).
        what: String,
        /// Requested start offset.
        offset: u64,
        /// Requested length.
        length: u64,
        /// The limit the request exceeded.
        limit: u64,
    },

    /// The descriptor changed underneath a writer between open and flush.
    #[error("concurrent modification of {path} (expected generation {expected}, found {actual})")]
    ConcurrentModification {
        /// Canonical path of the file.
        path: String,
        /// Generation the writer based its blocks on.
        expected: u64,
        /// Generation found in the store at flush time.
        actual: u64,
    },

    /// Failure reported by the backing column store.
    #[error("backing store error: {0}")]
    Backing(String),

    /// I/O error (filesystem-backed stores, stream adapters).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Format error (corrupt, unexpected, unsupported).
    #[error("format error: {0}")]
    Format(String),

    /// CRC mismatch (data corruption detected).
    #[error("crc mismatch (expected {expected:#010x}, got {actual:#010x})")]
    CrcMismatch {
        /// CRC stored in the column header.
        expected: u32,
        /// CRC computed from the bytes that were read.
        actual: u32,
    },

    /// Encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid state (operation not allowed in current state).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Lock acquisition failed.
    #[error("lock failed on {resource}: {reason}")]
    LockFailed {
        /// What we were trying to lock.
        resource: String,
        /// Human-readable reason.
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn poisoned(resource: &str) -> Self {
        StoreError::LockFailed {
            resource: resource.to_string(),
            reason: "lock poisoned".to_string(),
        }
    }

    /// Whether this error means "the path does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<StoreError> for std::io::Error {
    fn from(e: StoreError) -> Self {
        use std::io::ErrorKind;
        match e {
            StoreError::Io(e) => e,
            StoreError::NotFound(_) => std::io::Error::new(ErrorKind::NotFound, e),
            StoreError::OutOfBounds { .. } => std::io::Error::new(ErrorKind::UnexpectedEof, e),
            StoreError::InvalidPath(_) | StoreError::InvalidConfig(_) => {
                std::io::Error::new(ErrorKind::InvalidInput, e)
            }
            StoreError::Format(_)
            | StoreError::CrcMismatch { .. }
            | StoreError::Decode(_)
            | StoreError::Encode(_) => std::io::Error::new(ErrorKind::InvalidData, e),
            other => std::io::Error::other(other),
        }
    }
}
