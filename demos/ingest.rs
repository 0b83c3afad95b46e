//! Copy every regular file under a local directory into a block directory.
//!
//! Usage: `cargo run --example ingest -- <source-dir> [<store-dir>]`
//!
//! Each file is an independent item: a failure is logged, the file is
//! skipped, and ingestion continues with the rest of the input.

use blockdir::{BlockDirectory, BlockOutputStream, DirectoryConfig, FsStore, StoreMetrics};
use log::{info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files larger than this are skipped rather than buffered.
const MAX_ITEM_BYTES: u64 = 256 * 1024 * 1024;

fn collect_files(root: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let ft = entry.file_type()?;
        if ft.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if ft.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

fn ingest_one(dir: &BlockDirectory, name: &str, src: &Path) -> Result<u64, String> {
    let len = std::fs::metadata(src).map_err(|e| e.to_string())?.len();
    if len > MAX_ITEM_BYTES {
        return Err(format!("{len} bytes exceeds the {MAX_ITEM_BYTES} byte item limit"));
    }
    let bytes = std::fs::read(src).map_err(|e| e.to_string())?;
    let mut out = BlockOutputStream::open(dir, name, false).map_err(|e| e.to_string())?;
    out.write_all(&bytes).map_err(|e| e.to_string())?;
    out.close().map_err(|e| e.to_string())?;
    Ok(len)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let source = PathBuf::from(args.next().unwrap_or_else(|| ".".into()));
    let store_root = match args.next() {
        Some(p) => PathBuf::from(p),
        None => std::env::temp_dir().join("blockdir-ingest"),
    };

    let store = Arc::new(FsStore::new(&store_root)?);
    let metrics = Arc::new(StoreMetrics::new());
    let dir = BlockDirectory::open(
        store,
        "/ingest",
        DirectoryConfig::new("lucene"),
        metrics.clone(),
    )?;

    let mut files = Vec::new();
    collect_files(&source, &mut files)?;
    files.sort();

    let mut ingested: Vec<String> = Vec::new();
    let (mut skipped, mut bytes) = (0usize, 0u64);
    for src in &files {
        let Ok(rel) = src.strip_prefix(&source) else {
            continue;
        };
        let name = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
        match ingest_one(&dir, &name, src) {
            Ok(n) => {
                info!("ingested {name} ({n} bytes)");
                bytes += n;
                ingested.push(name);
            }
            Err(e) => {
                warn!("skipping {name}: {e}");
                skipped += 1;
            }
        }
    }

    let names: Vec<&str> = ingested.iter().map(String::as_str).collect();
    dir.sync(&names)?;
    println!(
        "ingested {} files ({bytes} bytes), skipped {skipped}, store at {}",
        ingested.len(),
        store_root.display()
    );
    println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
    Ok(())
}
