//! A single-node wide-column storage engine.
//!
//! Data is organised in tables of column families; each cell is addressed by
//! row, family, qualifier and timestamp. Writes land in a per-family memtable
//! backed by a write-ahead log and are flushed into immutable sorted
//! segments, which compaction merges according to each family's retention
//! policy.

pub mod cell;
pub mod column_family;
pub mod compaction;
pub mod compression;
pub mod db;
pub mod env;
pub mod iterator;
pub mod manifest;
pub mod memtable;
pub mod segment;
pub mod statistics;
pub mod table;
pub mod util;
pub mod wal;

pub use cell::{Cell, CellCodec, CellKey};
pub use column_family::{ColumnFamilyDescriptor, ColumnFamilyOptions, ColumnFamilyStore};
pub use compression::CompressionType;
pub use db::{Database, DatabaseOptions};
pub use env::{DiskEnv, Env, MemEnv};
pub use statistics::Statistics;
pub use table::{
    Delete, Get, Put, RowResult, ScanOptions, Table, TableDescriptor, TableOptions, TableScanner,
    TableState,
};
pub use util::{Clock, ManualClock, Result, Status, SystemClock};
