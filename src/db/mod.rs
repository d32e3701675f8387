#[allow(clippy::module_inception)]
mod db;

pub use db::{CATALOG_FILE_NAME, Database, DatabaseOptions};
