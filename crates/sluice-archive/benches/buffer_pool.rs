use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use sluice_archive::{BufferClass, BufferPool, Engine, EntryHeader, ExtractOptions};
use sluice_archive::{ArchiveEntry, EntrySource, Result};
use sluice_fs::MemorySink;
use std::io::Cursor;

fn bench_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_acquire_release");

    for class in BufferClass::ALL {
        group.bench_with_input(BenchmarkId::new("warm", format!("{class:?}")), &class, |b, &class| {
            let mut pool = BufferPool::new();
            b.iter(|| {
                let handle = pool.acquire(black_box(class));
                pool.buf_mut(&handle)[0] = 1;
                pool.release(handle);
            });
        });

        // Free list disabled: every acquire allocates.
        group.bench_with_input(BenchmarkId::new("cold", format!("{class:?}")), &class, |b, &class| {
            let mut pool = BufferPool::new().free_cap(0);
            b.iter(|| {
                let handle = pool.acquire(black_box(class));
                pool.release(handle);
            });
        });
    }

    group.finish();
}

struct Repeat {
    remaining: usize,
    size: usize,
}

impl EntrySource for Repeat {
    fn next_entry(&mut self) -> Option<Result<ArchiveEntry<'_>>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let header = EntryHeader::file(format!("file-{}", self.remaining), self.size as u64);
        Some(Ok(ArchiveEntry::new(header, Cursor::new(vec![0u8; self.size]))))
    }
}

fn bench_streaming_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming_copy");
    let count = 16;

    for size in [64 * 1024, 1024 * 1024, 4 * 1024 * 1024] {
        group.throughput(Throughput::Bytes((size * count) as u64));
        group.bench_with_input(BenchmarkId::new("entry_size", size), &size, |b, &size| {
            let mut engine = Engine::new();
            let options = ExtractOptions::default().use_streaming(true);
            b.iter(|| {
                let mut source = Repeat {
                    remaining: count,
                    size,
                };
                let mut sink = MemorySink::new();
                let result = engine
                    .extract_with_source(&mut source, &mut sink, &options)
                    .unwrap();
                black_box(result.total_bytes_written)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_acquire_release, bench_streaming_copy);
criterion_main!(benches);
