/// Cells: the smallest stored unit of the wide-column model.
///
/// A cell is one value at one `(row, family, qualifier, timestamp)`
/// coordinate, or a tombstone marking every version at or below its
/// timestamp as deleted.
///
/// # Ordering
///
/// ```text
/// row_key asc → family asc → qualifier asc → timestamp desc → tombstone first
/// ```
///
/// Newest versions of a coordinate sort first, so a forward scan meets the
/// version a reader most likely wants before any older one. At an equal
/// timestamp the tombstone precedes the value it deletes.
pub mod codec;

use std::{cmp::Ordering, fmt, sync::Arc};

use bytes::Bytes;

pub use codec::CellCodec;

#[derive(Clone, PartialEq, Eq)]
pub struct Cell {
    row: Bytes,
    family: Arc<str>,
    qualifier: Bytes,
    timestamp: i64,
    value: Bytes,
    tombstone: bool,
}

impl Cell {
    pub fn put(
        row: impl Into<Bytes>,
        family: impl Into<Arc<str>>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
        value: impl Into<Bytes>,
    ) -> Self {
        Cell {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            value: value.into(),
            tombstone: false,
        }
    }

    pub fn tombstone(
        row: impl Into<Bytes>,
        family: impl Into<Arc<str>>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
    ) -> Self {
        Cell {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            value: Bytes::new(),
            tombstone: true,
        }
    }

    pub(crate) fn from_parts(key: CellKey, value: Bytes) -> Self {
        Cell {
            row: key.row,
            family: key.family,
            qualifier: key.qualifier,
            timestamp: key.timestamp,
            value,
            tombstone: key.tombstone,
        }
    }

    pub fn row(&self) -> &Bytes {
        &self.row
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub(crate) fn family_arc(&self) -> &Arc<str> {
        &self.family
    }

    pub fn qualifier(&self) -> &Bytes {
        &self.qualifier
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    pub fn key(&self) -> CellKey {
        CellKey {
            row: self.row.clone(),
            family: Arc::clone(&self.family),
            qualifier: self.qualifier.clone(),
            timestamp: self.timestamp,
            tombstone: self.tombstone,
        }
    }

    fn parts(&self) -> KeyParts<'_> {
        (&self.row[..], &*self.family, &self.qualifier[..], self.timestamp, self.tombstone)
    }

    /// Compare by ordering key only; the value takes no part.
    pub fn cmp_key(&self, other: &Cell) -> Ordering {
        compare_key_parts(self.parts(), other.parts())
    }

    /// Same row, family and qualifier, any timestamp
    pub fn same_column(&self, other: &Cell) -> bool {
        self.row == other.row && self.family == other.family && self.qualifier == other.qualifier
    }

    /// Approximate in-memory footprint, used for the flush threshold
    pub fn approximate_size(&self) -> usize {
        self.row.len() + self.family.len() + self.qualifier.len() + self.value.len() + 8 + 1
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cell({}/{}:{}@{}",
            String::from_utf8_lossy(&self.row),
            self.family,
            String::from_utf8_lossy(&self.qualifier),
            self.timestamp
        )?;
        if self.tombstone {
            write!(f, " DELETE)")
        } else {
            write!(f, " = {})", String::from_utf8_lossy(&self.value))
        }
    }
}

/// Ordering key of a cell.
///
/// Also used as the memtable map key, so two writes with an identical key
/// replace each other.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub row: Bytes,
    pub family: Arc<str>,
    pub qualifier: Bytes,
    pub timestamp: i64,
    pub tombstone: bool,
}

impl CellKey {
    fn parts(&self) -> KeyParts<'_> {
        (&self.row[..], &*self.family, &self.qualifier[..], self.timestamp, self.tombstone)
    }

    /// Smallest possible key of `row`: seeking here lands on the row's first cell
    pub fn first_of_row(row: impl Into<Bytes>) -> Self {
        CellKey {
            row: row.into(),
            family: Arc::from(""),
            qualifier: Bytes::new(),
            timestamp: i64::MAX,
            tombstone: true,
        }
    }

    /// Smallest possible key of one column: its newest version
    pub fn first_of_column(
        row: impl Into<Bytes>,
        family: Arc<str>,
        qualifier: impl Into<Bytes>,
    ) -> Self {
        CellKey {
            row: row.into(),
            family,
            qualifier: qualifier.into(),
            timestamp: i64::MAX,
            tombstone: true,
        }
    }
}

impl Ord for CellKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_key_parts(self.parts(), other.parts())
    }
}

impl PartialOrd for CellKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type KeyParts<'a> = (&'a [u8], &'a str, &'a [u8], i64, bool);

#[inline]
fn compare_key_parts(a: KeyParts<'_>, b: KeyParts<'_>) -> Ordering {
    a.0.cmp(b.0)
        .then_with(|| a.1.cmp(b.1))
        .then_with(|| a.2.cmp(b.2))
        // Newest first
        .then_with(|| b.3.cmp(&a.3))
        // Tombstone before a value at the same timestamp
        .then_with(|| b.4.cmp(&a.4))
}
