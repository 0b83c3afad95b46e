//! Many threads writing through one directory.

use blockdir::{
    BlockDirectory, DirectoryConfig, IoContext, MemoryStore, StoreError, StoreMetrics,
};
use std::io::Read;
use std::sync::Arc;
use std::thread;

fn open(block_size: usize) -> BlockDirectory {
    BlockDirectory::open(
        Arc::new(MemoryStore::new()),
        "/idx",
        DirectoryConfig::new("t").with_block_size(block_size),
        Arc::new(StoreMetrics::new()),
    )
    .unwrap()
}

#[test]
fn parallel_creates_are_all_listed() {
    let dir = open(8);
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let dir = dir.clone();
            thread::spawn(move || {
                for i in 0..16 {
                    let name = format!("seg_{t}/_{i}.cfs");
                    let mut h = dir.create_output(&name, IoContext::Default).unwrap();
                    h.write(name.as_bytes()).unwrap();
                    h.close().unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(dir.list_all().unwrap().len(), 8);
    for t in 0..8 {
        let files = dir.list_files(Some(format!("seg_{t}").as_str()), None).unwrap();
        assert_eq!(files.len(), 16);
        for f in files {
            let mut out = Vec::new();
            dir.open_input(&format!("seg_{t}/{}", f.path.leaf()), IoContext::Default)
                .unwrap()
                .read_to_end(&mut out)
                .unwrap();
            assert_eq!(out, format!("seg_{t}/{}", f.path.leaf()).into_bytes());
        }
    }
}

#[test]
fn racing_appends_never_lose_a_committed_byte() {
    let dir = open(4);
    let mut h = dir.create_output("log", IoContext::Default).unwrap();
    h.write(b"#").unwrap();
    h.close().unwrap();

    const PER_THREAD: usize = 25;
    let handles: Vec<_> = (0..4u8)
        .map(|t| {
            let dir = dir.clone();
            thread::spawn(move || {
                let mut done = 0;
                while done < PER_THREAD {
                    let mut a = dir.append_output("log").unwrap();
                    a.write(&[b'a' + t]).unwrap();
                    match a.close() {
                        Ok(()) => done += 1,
                        Err(StoreError::ConcurrentModification { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut out = Vec::new();
    dir.open_input("log", IoContext::Default)
        .unwrap()
        .read_to_end(&mut out)
        .unwrap();
    assert_eq!(out.len(), 1 + 4 * PER_THREAD);
    assert_eq!(dir.file_length("log").unwrap(), out.len() as u64);
    for t in 0..4u8 {
        let n = out.iter().filter(|&&b| b == b'a' + t).count();
        assert_eq!(n, PER_THREAD);
    }
}
