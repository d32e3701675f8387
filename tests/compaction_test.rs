use std::{collections::BTreeMap, sync::Arc};

use colstore::{
    ColumnFamilyDescriptor, ColumnFamilyOptions, Database, DatabaseOptions, Delete, Get,
    ManualClock, MemEnv, Put, ScanOptions, Table, TableDescriptor, TableOptions,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn open_db(clock: &Arc<ManualClock>, background_jobs: bool) -> Database {
    let options = DatabaseOptions {
        table_options: TableOptions {
            background_jobs,
            clock: clock.clone(),
            ..Default::default()
        },
        ..Default::default()
    };
    Database::open_with_env(Arc::new(MemEnv::new()), options).unwrap()
}

fn history_descriptor(write_buffer_size: usize) -> TableDescriptor {
    TableDescriptor::new("metrics", vec![
        ColumnFamilyDescriptor::new("history", ColumnFamilyOptions {
            write_buffer_size,
            max_versions: 2,
            compaction_trigger: 3,
            ..Default::default()
        }),
        ColumnFamilyDescriptor::new("latest", ColumnFamilyOptions {
            write_buffer_size,
            ..Default::default()
        }),
    ])
}

/// Every visible (row, family, qualifier, timestamp) -> value
fn snapshot(table: &Table) -> BTreeMap<(Vec<u8>, String, Vec<u8>, i64), Vec<u8>> {
    table
        .scan(&ScanOptions::new().max_versions(10))
        .unwrap()
        .flat_map(|row| row.unwrap().into_cells())
        .map(|c| {
            (
                (
                    c.row().to_vec(),
                    c.family().to_string(),
                    c.qualifier().to_vec(),
                    c.timestamp(),
                ),
                c.value().to_vec(),
            )
        })
        .collect()
}

fn write_history(table: &Table, rows: usize, versions: i64) {
    for ts in 1..=versions {
        for r in 0..rows {
            table
                .put(
                    &Put::new(format!("host{r:03}"))
                        .with_timestamp(ts)
                        .add_column("history", "cpu", format!("{}", ts * 10 + r as i64))
                        .add_column("latest", "cpu", format!("{ts}")),
                )
                .unwrap();
        }
        if ts % 3 == 0 {
            table
                .delete(
                    &Delete::new(format!("host{:03}", ts as usize % rows))
                        .with_timestamp(ts)
                        .add_family("latest"),
                )
                .unwrap();
        }
        table.flush().unwrap();
    }
}

#[test]
fn test_major_compaction_preserves_reads() {
    init_logger();
    let clock = Arc::new(ManualClock::new(1_000));
    let db = open_db(&clock, false);
    let table = db
        .create_table(&history_descriptor(64 << 10))
        .unwrap();

    write_history(&table, 10, 8);
    let before = snapshot(&table);
    assert!(!before.is_empty());

    table.compact().unwrap();
    for family in ["history", "latest"] {
        assert_eq!(table.column_family(family).unwrap().num_segments(), 1);
    }
    assert_eq!(snapshot(&table), before);

    let stats = db.statistics().snapshot();
    assert!(stats.num_compactions >= 2);
    assert!(stats.compaction_cells_dropped > 0);
}

#[test]
fn test_minor_compactions_keep_segment_count_bounded() {
    init_logger();
    let clock = Arc::new(ManualClock::new(1_000));
    let db = open_db(&clock, false);
    let table = db
        .create_table(&history_descriptor(64 << 10))
        .unwrap();

    write_history(&table, 5, 12);
    let history = table.column_family("history").unwrap();
    assert!(history.num_segments() <= 3);

    for r in 0..5 {
        let row = table
            .get(&Get::new(format!("host{r:03}")).add_family("history").max_versions(5))
            .unwrap();
        let timestamps: Vec<i64> = row.versions("history", b"cpu").map(|c| c.timestamp()).collect();
        assert_eq!(timestamps, vec![12, 11]);
    }
}

#[test]
fn test_major_compaction_with_covered_put_in_memtable() {
    init_logger();
    let clock = Arc::new(ManualClock::new(1_000));
    let db = open_db(&clock, false);
    let table = db
        .create_table(&history_descriptor(64 << 10))
        .unwrap();

    table
        .put(&Put::new("host000").with_timestamp(1).add_column("history", "cpu", "a"))
        .unwrap();
    table.flush().unwrap();
    table
        .delete(&Delete::new("host000").with_timestamp(5).add_column("history", "cpu"))
        .unwrap();
    table.flush().unwrap();
    table
        .put(&Put::new("host000").with_timestamp(3).add_column("history", "cpu", "b"))
        .unwrap();
    table
        .put(&Put::new("host001").with_timestamp(3).add_column("history", "cpu", "c"))
        .unwrap();

    let before = snapshot(&table);
    assert_eq!(before.len(), 1);
    table.compact().unwrap();
    assert_eq!(snapshot(&table), before);

    let history = table.column_family("history").unwrap();
    history.compact(true).unwrap();
    assert_eq!(snapshot(&table), before);
    assert!(table.get(&Get::new("host000")).unwrap().is_empty());
}

#[test]
fn test_ttl_expires_on_read_and_compaction() {
    init_logger();
    let clock = Arc::new(ManualClock::new(10_000));
    let db = open_db(&clock, false);
    let descriptor = TableDescriptor::new("sessions", vec![ColumnFamilyDescriptor::new(
        "s",
        ColumnFamilyOptions {
            ttl: Some(1_000),
            min_versions: 1,
            max_versions: 3,
            ..Default::default()
        },
    )]);
    let table = db.create_table(&descriptor).unwrap();

    for ts in [9_500, 9_700, 9_900] {
        table
            .put(&Put::new("alice").with_timestamp(ts).add_column("s", "token", ts.to_string()))
            .unwrap();
    }
    table.flush().unwrap();

    let versions = |table: &Table| -> Vec<i64> {
        table
            .get(&Get::new("alice").max_versions(3))
            .unwrap()
            .versions("s", b"token")
            .map(|c| c.timestamp())
            .collect()
    };
    assert_eq!(versions(&table), vec![9_900, 9_700, 9_500]);

    // 9_500 and 9_700 fall out of the window; min_versions keeps the newest
    clock.set(10_800);
    assert_eq!(versions(&table), vec![9_900]);
    clock.set(20_000);
    assert_eq!(versions(&table), vec![9_900]);

    table.compact().unwrap();
    assert_eq!(versions(&table), vec![9_900]);
    assert_eq!(db.statistics().snapshot().compaction_cells_dropped, 2);
}

#[test]
fn test_background_flush_and_compaction() {
    init_logger();
    let clock = Arc::new(ManualClock::new(1_000));
    let db = open_db(&clock, true);
    let table = db.create_table(&history_descriptor(1024)).unwrap();

    for i in 0..500 {
        table
            .put(
                &Put::new(format!("host{:03}", i % 50))
                    .with_timestamp(i / 50 + 1)
                    .add_column("history", "cpu", "x".repeat(32))
                    .add_column("latest", "cpu", i.to_string()),
            )
            .unwrap();
    }
    table.wait_for_background_jobs();

    let stats = db.statistics().snapshot();
    assert!(stats.num_flushes > 0);
    assert_eq!(stats.num_errors, 0);
    assert!(table.column_family("history").unwrap().num_segments() <= 3);
    assert!(table.column_family("latest").unwrap().num_segments() <= 4);

    for r in 0..50 {
        let row = table
            .get(&Get::new(format!("host{r:03}")).add_column("latest", "cpu"))
            .unwrap();
        assert_eq!(row.cells()[0].timestamp(), 10);
        assert_eq!(&row.cells()[0].value()[..], (450 + r).to_string().as_bytes());
    }

    db.disable_table("metrics").unwrap();
    db.drop_table("metrics").unwrap();
}
