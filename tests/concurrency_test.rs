use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use colstore::{
    ColumnFamilyDescriptor, ColumnFamilyOptions, Database, DatabaseOptions, Get, MemEnv, Put,
    ScanOptions, TableDescriptor,
};

const WRITERS: usize = 4;
const ROWS_PER_WRITER: usize = 300;

fn open_table() -> (Database, Arc<colstore::Table>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let db = Database::open_with_env(Arc::new(MemEnv::new()), DatabaseOptions::default()).unwrap();
    let family = |name: &str| {
        ColumnFamilyDescriptor::new(name, ColumnFamilyOptions {
            write_buffer_size: 4 * 1024,
            compaction_trigger: 3,
            ..Default::default()
        })
    };
    let table = db
        .create_table(&TableDescriptor::new("load", vec![family("a"), family("b")]))
        .unwrap();
    (db, table)
}

/// Writers on disjoint rows with flushes and compactions running behind them
#[test]
fn test_concurrent_writers_and_scanners() {
    let (db, table) = open_table();
    let stop = Arc::new(AtomicBool::new(false));

    let scanners: Vec<_> = (0..2)
        .map(|_| {
            let table = Arc::clone(&table);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let mut previous: Option<Vec<u8>> = None;
                    for row in table.scan(&ScanOptions::new()).unwrap() {
                        let row = row.unwrap();
                        let key = row.row().to_vec();
                        if let Some(previous) = &previous {
                            assert!(previous < &key, "scan out of order");
                        }
                        assert!(!row.is_empty());
                        previous = Some(key);
                    }
                }
            })
        })
        .collect();

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..ROWS_PER_WRITER {
                    table
                        .put(
                            &Put::new(format!("w{w}-{i:05}"))
                                .add_column("a", "value", format!("{w}:{i}"))
                                .add_column("b", "pad", "p".repeat(48)),
                        )
                        .unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, Ordering::Release);
    for scanner in scanners {
        scanner.join().unwrap();
    }
    table.wait_for_background_jobs();

    for w in 0..WRITERS {
        for i in 0..ROWS_PER_WRITER {
            let row = table.get(&Get::new(format!("w{w}-{i:05}"))).unwrap();
            assert_eq!(
                &row.value("a", b"value").unwrap()[..],
                format!("{w}:{i}").as_bytes()
            );
        }
    }
    assert_eq!(
        table.scan(&ScanOptions::new()).unwrap().count(),
        WRITERS * ROWS_PER_WRITER
    );
    assert_eq!(db.statistics().snapshot().num_errors, 0);
    assert!(db.statistics().snapshot().num_flushes > 0);
}

/// Concurrent overwrites of the same column leave exactly one newest value
#[test]
fn test_concurrent_overwrites_same_column() {
    let (_db, table) = open_table();

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..200i64 {
                    table
                        .put(
                            &Put::new("hot")
                                .with_timestamp(i * WRITERS as i64 + w as i64)
                                .add_column("a", "counter", i.to_string()),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    table.flush().unwrap();
    table.wait_for_background_jobs();

    let row = table.get(&Get::new("hot")).unwrap();
    assert_eq!(row.cells().len(), 1);
    assert_eq!(row.cells()[0].timestamp(), 199 * WRITERS as i64 + WRITERS as i64 - 1);
}
