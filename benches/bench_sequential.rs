//! Benchmarks for sequential block writes and reads.
#![allow(missing_docs)]

use blockdir::{BlockDirectory, DirectoryConfig, FsStore, IoContext, MemoryStore, StoreMetrics};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::io::Read;
use std::sync::Arc;

const FILE_BYTES: usize = 1024 * 1024;

fn payload() -> Vec<u8> {
    (0..FILE_BYTES).map(|i| (i % 251) as u8).collect()
}

fn memory_dir(config: DirectoryConfig) -> BlockDirectory {
    BlockDirectory::open(
        Arc::new(MemoryStore::new()),
        "/bench",
        config,
        Arc::new(StoreMetrics::new()),
    )
    .unwrap()
}

fn write_file(dir: &BlockDirectory, data: &[u8], chunk: usize) {
    let mut h = dir.create_output("_0.cfs", IoContext::Default).unwrap();
    for c in data.chunks(chunk) {
        h.write(c).unwrap();
    }
    h.close().unwrap();
}

fn bench_sequential(c: &mut Criterion) {
    let data = payload();
    let mut group = c.benchmark_group("sequential");

    for block_size in [4 * 1024, 16 * 1024, 64 * 1024] {
        group.bench_function(format!("write_1m_memory_block_{block_size}"), |b| {
            b.iter_batched(
                || memory_dir(DirectoryConfig::new("bench").with_block_size(block_size)),
                |dir| write_file(&dir, &data, 8 * 1024),
                BatchSize::SmallInput,
            );
        });
    }

    group.bench_function("read_1m_memory", |b| {
        let dir = memory_dir(DirectoryConfig::new("bench"));
        write_file(&dir, &data, 8 * 1024);
        b.iter(|| {
            let mut out = Vec::with_capacity(FILE_BYTES);
            dir.open_input("_0.cfs", IoContext::Default)
                .unwrap()
                .read_to_end(&mut out)
                .unwrap();
            std::hint::black_box(out);
        });
    });

    group.bench_function("read_1m_memory_cached", |b| {
        let dir = memory_dir(DirectoryConfig::new("bench").with_cache(128));
        write_file(&dir, &data, 8 * 1024);
        b.iter(|| {
            let mut out = Vec::with_capacity(FILE_BYTES);
            dir.open_input("_0.cfs", IoContext::Default)
                .unwrap()
                .read_to_end(&mut out)
                .unwrap();
            std::hint::black_box(out);
        });
    });

    group.bench_function("write_1m_fs", |b| {
        b.iter_batched(
            || {
                let tmp = tempfile::tempdir().unwrap();
                let store = Arc::new(FsStore::new(tmp.path()).unwrap());
                let dir = BlockDirectory::open(
                    store,
                    "/bench",
                    DirectoryConfig::new("bench"),
                    Arc::new(StoreMetrics::new()),
                )
                .unwrap();
                (tmp, dir)
            },
            |(_tmp, dir)| write_file(&dir, &data, 8 * 1024),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("byte_at_a_time_64k_memory", |b| {
        b.iter_batched(
            || memory_dir(DirectoryConfig::new("bench")),
            |dir| {
                let mut h = dir.create_output("f", IoContext::Default).unwrap();
                for &x in &data[..64 * 1024] {
                    h.write_byte(x, false).unwrap();
                }
                h.close().unwrap();
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_sequential);
criterion_main!(benches);
