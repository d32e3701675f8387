//! Request and result types of the table API.

use bytes::Bytes;

use crate::cell::Cell;

/// Cells to write to one row
///
/// ```ignore
/// let put = Put::new("user001")
///     .add_column("base_info", "username", "zhangsan")
///     .add_column("base_info", "password", "123456")
///     .with_timestamp(42);
/// table.put(&put)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub row: Bytes,
    /// `None` stamps the cells with the table clock at write time
    pub timestamp: Option<i64>,
    /// (family, qualifier, value)
    pub columns: Vec<(String, Bytes, Bytes)>,
}

impl Put {
    pub fn new(row: impl Into<Bytes>) -> Self {
        Put {
            row: row.into(),
            timestamp: None,
            columns: Vec::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn add_column(
        mut self,
        family: impl Into<String>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        self.columns
            .push((family.into(), qualifier.into(), value.into()));
        self
    }
}

/// Point read of one row
///
/// Without any family or column every family is read. A family listed with
/// [`Get::add_family`] is read whole; [`Get::add_column`] narrows a family
/// to the given qualifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Get {
    pub row: Bytes,
    pub families: Vec<String>,
    /// (family, qualifier)
    pub columns: Vec<(String, Bytes)>,
    /// Versions per column, capped by each family's `max_versions`
    pub max_versions: usize,
}

impl Get {
    pub fn new(row: impl Into<Bytes>) -> Self {
        Get {
            row: row.into(),
            families: Vec::new(),
            columns: Vec::new(),
            max_versions: 1,
        }
    }

    pub fn add_family(mut self, family: impl Into<String>) -> Self {
        self.families.push(family.into());
        self
    }

    pub fn add_column(mut self, family: impl Into<String>, qualifier: impl Into<Bytes>) -> Self {
        self.columns.push((family.into(), qualifier.into()));
        self
    }

    pub fn max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = max_versions;
        self
    }
}

/// Tombstones for one row
///
/// Without any family or column the whole row is deleted. Versions newer
/// than the delete timestamp stay visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    pub row: Bytes,
    /// `None` uses the table clock
    pub timestamp: Option<i64>,
    pub families: Vec<String>,
    /// (family, qualifier)
    pub columns: Vec<(String, Bytes)>,
}

impl Delete {
    pub fn new(row: impl Into<Bytes>) -> Self {
        Delete {
            row: row.into(),
            timestamp: None,
            families: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn add_family(mut self, family: impl Into<String>) -> Self {
        self.families.push(family.into());
        self
    }

    pub fn add_column(mut self, family: impl Into<String>, qualifier: impl Into<Bytes>) -> Self {
        self.columns.push((family.into(), qualifier.into()));
        self
    }
}

/// Range and shape of a table scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Inclusive
    pub start_row: Option<Bytes>,
    /// Exclusive
    pub stop_row: Option<Bytes>,
    /// Empty means every family
    pub families: Vec<String>,
    pub max_versions: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            start_row: None,
            stop_row: None,
            families: Vec::new(),
            max_versions: 1,
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_row(mut self, row: impl Into<Bytes>) -> Self {
        self.start_row = Some(row.into());
        self
    }

    pub fn stop_row(mut self, row: impl Into<Bytes>) -> Self {
        self.stop_row = Some(row.into());
        self
    }

    pub fn add_family(mut self, family: impl Into<String>) -> Self {
        self.families.push(family.into());
        self
    }

    pub fn max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = max_versions;
        self
    }
}

/// Visible cells of one row, in key order: family, qualifier, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowResult {
    row: Bytes,
    cells: Vec<Cell>,
}

impl RowResult {
    pub fn new(row: Bytes, cells: Vec<Cell>) -> Self {
        RowResult { row, cells }
    }

    pub fn row(&self) -> &Bytes {
        &self.row
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Newest value of a column
    pub fn value(&self, family: &str, qualifier: &[u8]) -> Option<&Bytes> {
        self.cells
            .iter()
            .find(|c| c.family() == family && &c.qualifier()[..] == qualifier)
            .map(Cell::value)
    }

    /// Every returned version of a column, newest first
    pub fn versions<'a>(
        &'a self,
        family: &'a str,
        qualifier: &'a [u8],
    ) -> impl Iterator<Item = &'a Cell> + 'a {
        self.cells
            .iter()
            .filter(move |c| c.family() == family && &c.qualifier()[..] == qualifier)
    }

    pub fn family_cells<'a>(&'a self, family: &'a str) -> impl Iterator<Item = &'a Cell> + 'a {
        self.cells.iter().filter(move |c| c.family() == family)
    }
}
