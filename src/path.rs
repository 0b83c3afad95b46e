//! Canonical path algebra.
//!
//! Paths are opaque hierarchical strings (`/a/b/c`). Canonicalization only
//! adds a leading separator, collapses runs of separators and drops a trailing
//! one; `.` and `..` are ordinary components and are never traversed.
//!
//! The canonical string doubles as the row key in the backing store.

use crate::error::{StoreError, StoreResult};
use std::fmt;

/// Path separator.
pub const SEPARATOR: char = '/';

/// An immutable path identifying one row.
///
/// Equality, ordering and hashing use the canonical string only; the raw form
/// the path was built from is kept so [`Path::parent`] can answer both the
/// "as constructed" and the canonical question.
#[derive(Clone)]
pub struct Path {
    raw: String,
    canonical: String,
}

impl Path {
    /// Parse `s` into a path.
    ///
    /// Fails with `InvalidPath` on an empty (or whitespace-only) string.
    pub fn new(s: &str) -> StoreResult<Self> {
        if s.trim().is_empty() {
            return Err(StoreError::InvalidPath("empty path".into()));
        }
        if s.contains('\0') {
            return Err(StoreError::InvalidPath(format!("path contains NUL: {s:?}")));
        }
        Ok(Self {
            raw: s.to_string(),
            canonical: canonicalize(s),
        })
    }

    /// The root path `/`.
    pub fn root() -> Self {
        Self {
            raw: "/".into(),
            canonical: "/".into(),
        }
    }

    /// Compose `dir` and a relative `name` into one path.
    ///
    /// `name` may itself contain separators (`"sub/file"`); a leading separator
    /// in `name` is treated as relative to `dir`, not as an absolute reset.
    pub fn resolve(dir: &Path, name: &str) -> StoreResult<Self> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidPath(format!(
                "empty name under {}",
                dir.canonical
            )));
        }
        let raw = format!("{}{}{}", dir.raw, SEPARATOR, name);
        Path::new(&raw)
    }

    /// Resolve `name` relative to `self`.
    pub fn join(&self, name: &str) -> StoreResult<Self> {
        Path::resolve(self, name)
    }

    /// The path's own canonical string.
    ///
    /// This is the full path, not a basename; use [`Path::leaf`] for the last
    /// component.
    pub fn name(&self) -> &str {
        &self.canonical
    }

    /// The last component (`"c"` for `/a/b/c`, `"/"` for the root).
    pub fn leaf(&self) -> &str {
        if self.is_root() {
            return &self.canonical;
        }
        match self.canonical.rfind(SEPARATOR) {
            Some(i) => &self.canonical[i + 1..],
            None => &self.canonical,
        }
    }

    /// Row key used for this path in the backing store.
    pub fn row_key(&self) -> &str {
        &self.canonical
    }

    /// The string this path was constructed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.canonical == "/"
    }

    /// The immediate containing path, or `None` for the root.
    ///
    /// With `canonical == false` the parent is cut from the raw string the path
    /// was built from (so a path built as `"/a//b"` + `"c"` yields a parent whose
    /// raw form is `"/a//b"`); with `canonical == true` the parent is always
    /// fully normalized. Both compare equal, since equality is canonical.
    pub fn parent(&self, canonical: bool) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        let cut = |s: &str| -> String {
            let trimmed = s.trim_end_matches(SEPARATOR);
            match trimmed.rfind(SEPARATOR) {
                Some(0) | None => "/".to_string(),
                Some(i) => trimmed[..i].to_string(),
            }
        };
        let canonical_parent = cut(&self.canonical);
        let raw = if canonical {
            canonical_parent.clone()
        } else {
            let raw_parent = cut(&self.raw);
            if raw_parent.trim_matches(SEPARATOR).is_empty() {
                "/".to_string()
            } else {
                raw_parent
            }
        };
        Some(Path {
            raw,
            canonical: canonical_parent,
        })
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        if self.is_root() || self.canonical == other.canonical {
            return true;
        }
        other
            .canonical
            .strip_prefix(&self.canonical)
            .is_some_and(|rest| rest.starts_with(SEPARATOR))
    }

}

fn canonicalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 1);
    for part in s.split(SEPARATOR).filter(|p| !p.is_empty()) {
        out.push(SEPARATOR);
        out.push_str(part);
    }
    if out.is_empty() {
        out.push(SEPARATOR);
    }
    out
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Path {}

impl std::hash::Hash for Path {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({:?})", self.canonical)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl std::str::FromStr for Path {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        Path::new(s)
    }
}
