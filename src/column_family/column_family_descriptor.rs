use serde::{Deserialize, Serialize};

use crate::column_family::ColumnFamilyOptions;

/// Name and options of a column family, as declared at table creation
///
/// # Example
///
/// ```ignore
/// use colstore::{ColumnFamilyDescriptor, ColumnFamilyOptions, TableDescriptor};
///
/// let table = TableDescriptor::new("users", vec![
///     ColumnFamilyDescriptor::new("base_info", ColumnFamilyOptions::default()),
///     ColumnFamilyDescriptor::new("history", ColumnFamilyOptions {
///         max_versions: 10,
///         ..Default::default()
///     }),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFamilyDescriptor {
    pub name: String,
    pub options: ColumnFamilyOptions,
}

impl ColumnFamilyDescriptor {
    pub fn new<S: Into<String>>(name: S, options: ColumnFamilyOptions) -> Self {
        ColumnFamilyDescriptor {
            name: name.into(),
            options,
        }
    }

    /// A family with default options
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self::new(name, ColumnFamilyOptions::default())
    }
}
