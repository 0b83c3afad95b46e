//! Column layout constants shared by readers and writers.
//!
//! - row key: canonical path string
//! - `DESCRIPTOR`: framed per-path metadata (see `descriptor`)
//! - `BLOCK-<n>`: raw payload of block `n` (zero-based), at most `block_size` bytes

/// Reserved column holding a path's descriptor.
pub const DESCRIPTOR_COLUMN: &str = "DESCRIPTOR";
/// Prefix of payload columns.
pub const BLOCK_COLUMN_PREFIX: &str = "BLOCK-";
/// Magic bytes at the start of every descriptor value.
pub const DESCRIPTOR_MAGIC: [u8; 4] = *b"BDSC";
/// Magic bytes at the start of a state blob (see `state`).
pub const STATE_MAGIC: [u8; 4] = *b"BSTA";
/// Current format version for descriptor and state framing.
pub const FORMAT_VERSION: u32 = 1;

/// Column name for block `index`.
pub fn block_column(index: u32) -> String {
    format!("{BLOCK_COLUMN_PREFIX}{index}")
}

/// Parse a block index back out of a column name.
pub fn parse_block_column(column: &str) -> Option<u32> {
    column.strip_prefix(BLOCK_COLUMN_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_columns_are_named_by_index() {
        assert_eq!(block_column(0), "BLOCK-0");
        assert_eq!(block_column(12), "BLOCK-12");
        assert_eq!(parse_block_column("BLOCK-12"), Some(12));
        assert_eq!(parse_block_column(DESCRIPTOR_COLUMN), None);
        assert_eq!(parse_block_column("BLOCK-x"), None);
    }
}
