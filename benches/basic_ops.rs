use std::{hint::black_box, sync::Arc};

use colstore::{
    ColumnFamilyDescriptor, ColumnFamilyOptions, CompressionType, Get, MemEnv, Put, ScanOptions,
    Statistics, Table, TableDescriptor, TableOptions,
};
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};

fn setup_table(compression: CompressionType) -> Arc<Table> {
    let descriptor = TableDescriptor::new("bench", vec![
        ColumnFamilyDescriptor::new("cf", ColumnFamilyOptions {
            write_buffer_size: 4 * 1024 * 1024,
            compression,
            max_versions: 3,
            ..Default::default()
        }),
    ]);
    let options = TableOptions {
        background_jobs: false,
        ..Default::default()
    };
    Table::create(
        Arc::new(MemEnv::new()),
        &descriptor,
        options,
        Arc::new(Statistics::new()),
    )
    .unwrap()
}

fn put_row(table: &Table, i: u64, value: &[u8]) {
    table
        .put(
            &Put::new(format!("row{i:010}"))
                .with_timestamp(i as i64)
                .add_column("cf", "q", value.to_vec()),
        )
        .unwrap();
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    for size in [100usize, 1024, 10 * 1024] {
        group.bench_function(format!("put_{size}b"), |b| {
            let table = setup_table(CompressionType::Snappy);
            let value = vec![b'x'; size];
            let mut i = 0u64;
            b.iter(|| {
                put_row(&table, i, &value);
                i += 1;
            });
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    // Served from the memtable
    group.bench_function("get_memtable", |b| {
        let table = setup_table(CompressionType::Snappy);
        let value = vec![b'x'; 100];
        for i in 0..1000 {
            put_row(&table, i, &value);
        }
        let mut i = 0u64;
        b.iter(|| {
            let row = table.get(&Get::new(format!("row{:010}", i % 1000))).unwrap();
            black_box(row);
            i += 1;
        });
    });

    for compression in [CompressionType::None, CompressionType::Snappy, CompressionType::Lz4] {
        group.bench_function(format!("get_segment_{compression:?}"), |b| {
            let table = setup_table(compression);
            let value = vec![b'x'; 100];
            for i in 0..10_000 {
                put_row(&table, i, &value);
            }
            table.flush().unwrap();
            let mut i = 0u64;
            b.iter(|| {
                let row = table
                    .get(&Get::new(format!("row{:010}", (i * 7919) % 10_000)))
                    .unwrap();
                black_box(row);
                i += 1;
            });
        });
    }

    group.bench_function("get_missing", |b| {
        let table = setup_table(CompressionType::Snappy);
        let value = vec![b'x'; 100];
        for i in 0..1000 {
            put_row(&table, i * 2, &value);
        }
        table.flush().unwrap();
        let mut i = 0u64;
        b.iter(|| {
            let row = table.get(&Get::new(format!("row{:010}", i * 2 + 1))).unwrap();
            black_box(row);
            i = (i + 1) % 1000;
        });
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("scan_1000_rows", |b| {
        let table = setup_table(CompressionType::Snappy);
        let value = vec![b'x'; 100];
        for i in 0..10_000 {
            put_row(&table, i, &value);
            if i % 2500 == 2499 {
                table.flush().unwrap();
            }
        }
        b.iter(|| {
            let rows = table
                .scan(
                    &ScanOptions::new()
                        .start_row(format!("row{:010}", 4000))
                        .stop_row(format!("row{:010}", 5000)),
                )
                .unwrap()
                .count();
            black_box(rows);
        });
    });

    group.finish();
}

fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");
    group.sample_size(10);

    group.bench_function("major_4_segments", |b| {
        b.iter_batched(
            || {
                let table = setup_table(CompressionType::Snappy);
                let value = vec![b'x'; 100];
                for round in 0..4u64 {
                    for i in 0..2_000 {
                        put_row(&table, i * 4 + round, &value);
                    }
                    table.flush().unwrap();
                }
                table
            },
            |table| table.compact().unwrap(),
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_put, bench_get, bench_scan, bench_compaction);
criterion_main!(benches);
