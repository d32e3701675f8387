/// Tables: the user-facing surface of the engine
///
/// A table owns one [`ColumnFamilyStore`](crate::column_family::ColumnFamilyStore)
/// per declared family and routes requests to them:
///
/// ```text
/// Table::put(Put)       → validate every cell → per-family write batch
/// Table::get(Get)       → per-family point reads → RowResult
/// Table::delete(Delete) → tombstones
/// Table::scan(ScanOptions)
///     ↓
/// TableScanner (joins rows by key)
///     ├─→ FamilyScanner("base_info")
///     └─→ FamilyScanner("history")
/// ```
mod request;
#[allow(clippy::module_inception)]
mod table;
mod table_options;
mod table_scanner;

pub use request::{Delete, Get, Put, RowResult, ScanOptions};
pub use table::{Table, validate_name};
pub use table_options::{TableDescriptor, TableOptions, TableState};
pub use table_scanner::TableScanner;
