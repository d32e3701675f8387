//! Property-based invariants of the storage engine
//!
//! Each property runs a random sequence of operations against a table and
//! against a simple in-memory model, then compares what the two return.
//!
//! - Write-read: the newest visible version of every column matches the model
//! - Deletes: a tombstone hides versions at or below its timestamp only
//! - Compaction: a major compaction leaves every read unchanged, even with
//!   writes hidden by a tombstone still sitting in the memtable
//! - Persistence: reopening the table changes nothing
//! - Ordering: scans return rows in strictly ascending order

use std::{collections::BTreeMap, sync::Arc};

use colstore::{
    ColumnFamilyDescriptor, ColumnFamilyOptions, Delete, Env, Get, MemEnv, Put, ScanOptions,
    Statistics, Table, TableDescriptor, TableOptions,
};
use proptest::prelude::*;

const FAMILY: &str = "cf";
const MAX_VERSIONS: usize = 3;

#[derive(Debug, Clone)]
enum Operation {
    Put { row: u8, qualifier: u8, timestamp: i64, value: Vec<u8> },
    Delete { row: u8, qualifier: u8, timestamp: i64 },
    Flush,
    Compact,
}

fn arbitrary_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        6 => (0..8u8, 0..3u8, 1..50i64, prop::collection::vec(any::<u8>(), 0..64))
            .prop_map(|(row, qualifier, timestamp, value)| {
                Operation::Put { row, qualifier, timestamp, value }
            }),
        2 => (0..8u8, 0..3u8, 1..50i64).prop_map(|(row, qualifier, timestamp)| {
            Operation::Delete { row, qualifier, timestamp }
        }),
        1 => Just(Operation::Flush),
        1 => Just(Operation::Compact),
    ]
}

/// Model of one family: per column, timestamp -> value, plus the newest
/// tombstone timestamp
#[derive(Debug, Default)]
struct Model {
    columns: BTreeMap<(Vec<u8>, Vec<u8>), (BTreeMap<i64, Vec<u8>>, Option<i64>)>,
}

impl Model {
    fn apply(&mut self, op: &Operation) {
        match op {
            Operation::Put { row, qualifier, timestamp, value } => {
                let (versions, _) = self.columns.entry(key(*row, *qualifier)).or_default();
                versions.insert(*timestamp, value.clone());
            },
            Operation::Delete { row, qualifier, timestamp } => {
                let (_, deleted_at) = self.columns.entry(key(*row, *qualifier)).or_default();
                *deleted_at = Some(deleted_at.map_or(*timestamp, |t| t.max(*timestamp)));
            },
            Operation::Flush => {},
            // Purged tombstones stop hiding versions written later
            Operation::Compact => {
                for (versions, deleted_at) in self.columns.values_mut() {
                    if let Some(deleted_at) = deleted_at.take() {
                        versions.retain(|ts, _| *ts > deleted_at);
                    }
                }
            },
        }
    }

    /// A put hidden by each column's tombstone
    fn covered_puts(&self) -> Vec<Operation> {
        self.columns
            .iter()
            .filter_map(|((row, qualifier), (_, deleted_at))| {
                deleted_at.map(|timestamp| (row, qualifier, timestamp))
            })
            .map(|(row, qualifier, timestamp)| Operation::Put {
                row: parse_suffix(row, "row"),
                qualifier: parse_suffix(qualifier, "q"),
                timestamp,
                value: b"covered".to_vec(),
            })
            .collect()
    }

    /// Visible versions, newest first
    fn visible(&self, row: &[u8], qualifier: &[u8]) -> Vec<(i64, Vec<u8>)> {
        let Some((versions, deleted_at)) = self.columns.get(&(row.to_vec(), qualifier.to_vec()))
        else {
            return Vec::new();
        };
        versions
            .iter()
            .rev()
            .filter(|(ts, _)| deleted_at.is_none_or(|d| **ts > d))
            .take(MAX_VERSIONS)
            .map(|(ts, v)| (*ts, v.clone()))
            .collect()
    }
}

fn key(row: u8, qualifier: u8) -> (Vec<u8>, Vec<u8>) {
    (row_key(row), qualifier_key(qualifier))
}

fn parse_suffix(key: &[u8], prefix: &str) -> u8 {
    std::str::from_utf8(&key[prefix.len()..]).unwrap().parse().unwrap()
}

fn row_key(row: u8) -> Vec<u8> {
    format!("row{row:02}").into_bytes()
}

fn qualifier_key(qualifier: u8) -> Vec<u8> {
    format!("q{qualifier}").into_bytes()
}

fn descriptor() -> TableDescriptor {
    TableDescriptor::new("prop", vec![ColumnFamilyDescriptor::new(FAMILY, ColumnFamilyOptions {
        max_versions: MAX_VERSIONS,
        write_buffer_size: 512,
        compaction_trigger: 3,
        ..Default::default()
    })])
}

fn table_options() -> TableOptions {
    TableOptions {
        background_jobs: false,
        ..Default::default()
    }
}

fn create(env: &MemEnv) -> Arc<Table> {
    Table::create(
        Arc::new(env.clone()),
        &descriptor(),
        table_options(),
        Arc::new(Statistics::new()),
    )
    .unwrap()
}

fn run(table: &Table, ops: &[Operation]) -> Model {
    let mut model = Model::default();
    apply(table, &mut model, ops);
    model
}

fn apply(table: &Table, model: &mut Model, ops: &[Operation]) {
    for op in ops {
        match op {
            Operation::Put { row, qualifier, timestamp, value } => table
                .put(
                    &Put::new(row_key(*row))
                        .with_timestamp(*timestamp)
                        .add_column(FAMILY, qualifier_key(*qualifier), value.clone()),
                )
                .unwrap(),
            Operation::Delete { row, qualifier, timestamp } => table
                .delete(
                    &Delete::new(row_key(*row))
                        .with_timestamp(*timestamp)
                        .add_column(FAMILY, qualifier_key(*qualifier)),
                )
                .unwrap(),
            Operation::Flush => table.flush().unwrap(),
            Operation::Compact => table.compact().unwrap(),
        }
        model.apply(op);
    }
}

fn read_all(table: &Table) -> BTreeMap<(Vec<u8>, Vec<u8>), Vec<(i64, Vec<u8>)>> {
    let mut result: BTreeMap<_, Vec<_>> = BTreeMap::new();
    for row in table
        .scan(&ScanOptions::new().max_versions(MAX_VERSIONS))
        .unwrap()
    {
        for cell in row.unwrap().into_cells() {
            result
                .entry((cell.row().to_vec(), cell.qualifier().to_vec()))
                .or_default()
                .push((cell.timestamp(), cell.value().to_vec()));
        }
    }
    result
}

fn expected(model: &Model) -> BTreeMap<(Vec<u8>, Vec<u8>), Vec<(i64, Vec<u8>)>> {
    model
        .columns
        .keys()
        .filter_map(|(row, qualifier)| {
            let visible = model.visible(row, qualifier);
            (!visible.is_empty()).then(|| ((row.clone(), qualifier.clone()), visible))
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_reads_match_model(ops in prop::collection::vec(arbitrary_operation(), 1..120)) {
        let env = MemEnv::new();
        let table = create(&env);
        let model = run(&table, &ops);

        prop_assert_eq!(read_all(&table), expected(&model));

        for row in 0..8u8 {
            for qualifier in 0..3u8 {
                let get = Get::new(row_key(row))
                    .add_column(FAMILY, qualifier_key(qualifier))
                    .max_versions(MAX_VERSIONS);
                let cells: Vec<(i64, Vec<u8>)> = table
                    .get(&get)
                    .unwrap()
                    .into_cells()
                    .into_iter()
                    .map(|c| (c.timestamp(), c.value().to_vec()))
                    .collect();
                prop_assert_eq!(cells, model.visible(&row_key(row), &qualifier_key(qualifier)));
            }
        }
    }

    #[test]
    fn prop_compaction_preserves_reads(
        ops in prop::collection::vec(arbitrary_operation(), 1..120)
    ) {
        let env = MemEnv::new();
        let table = create(&env);
        let mut model = run(&table, &ops);
        let covered = model.covered_puts();
        apply(&table, &mut model, &covered);

        let before = read_all(&table);
        prop_assert_eq!(&before, &expected(&model));
        table.column_family(FAMILY).unwrap().compact(true).unwrap();
        prop_assert_eq!(read_all(&table), before);
        prop_assert!(table.column_family(FAMILY).unwrap().num_segments() <= 1);
    }

    #[test]
    fn prop_reopen_preserves_reads(ops in prop::collection::vec(arbitrary_operation(), 1..120)) {
        let env = MemEnv::new();
        let before = {
            let table = create(&env);
            run(&table, &ops);
            read_all(&table)
        };
        prop_assert!(env.exists("prop/MANIFEST"));

        let table = Table::open(
            Arc::new(env.clone()),
            "prop",
            table_options(),
            Arc::new(Statistics::new()),
        )
        .unwrap();
        prop_assert_eq!(read_all(&table), before);
    }

    #[test]
    fn prop_scan_rows_ascending(ops in prop::collection::vec(arbitrary_operation(), 1..120)) {
        let env = MemEnv::new();
        let table = create(&env);
        run(&table, &ops);

        let rows: Vec<Vec<u8>> = table
            .scan(&ScanOptions::new())
            .unwrap()
            .map(|row| row.unwrap().row().to_vec())
            .collect();
        prop_assert!(rows.windows(2).all(|w| w[0] < w[1]));
    }
}
