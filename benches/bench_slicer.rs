//! Benchmarks for random-access slices.
#![allow(missing_docs)]

use blockdir::{BlockDirectory, DirectoryConfig, IoContext, MemoryStore, StoreMetrics};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn setup(config: DirectoryConfig) -> BlockDirectory {
    let dir = BlockDirectory::open(
        Arc::new(MemoryStore::new()),
        "/bench",
        config,
        Arc::new(StoreMetrics::new()),
    )
    .unwrap();
    let data: Vec<u8> = (0..512 * 1024).map(|i| (i % 253) as u8).collect();
    let mut h = dir.create_output("_0.tim", IoContext::Default).unwrap();
    h.write(&data).unwrap();
    h.close().unwrap();
    dir
}

fn bench_slicer(c: &mut Criterion) {
    let mut group = c.benchmark_group("slicer");

    for (label, config) in [
        ("plain", DirectoryConfig::new("bench").with_block_size(4096)),
        (
            "cached",
            DirectoryConfig::new("bench")
                .with_block_size(4096)
                .with_cache(256),
        ),
    ] {
        let dir = setup(config);
        let slicer = dir.create_slicer("_0.tim", IoContext::Default).unwrap();

        group.bench_function(format!("strided_reads_{label}"), |b| {
            b.iter(|| {
                let mut s = slicer.open_full("terms").unwrap();
                let mut buf = [0u8; 48];
                let mut off = 0u64;
                while off + 48 <= s.length() {
                    s.seek(off).unwrap();
                    s.read_bytes(&mut buf).unwrap();
                    off += 7919;
                }
                std::hint::black_box(buf);
            });
        });

        group.bench_function(format!("cross_block_window_{label}"), |b| {
            b.iter(|| {
                let mut s = slicer.open_slice("window", 4000, 8200).unwrap();
                let mut buf = vec![0u8; 8200];
                s.read_bytes(&mut buf).unwrap();
                std::hint::black_box(buf);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_slicer);
criterion_main!(benches);
