use std::{
    collections::BTreeMap,
    path::Path,
    sync::Arc,
};

use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::{
    env::{DiskEnv, Env},
    manifest::manifest_file_name,
    statistics::Statistics,
    table::{Table, TableDescriptor, TableOptions, validate_name},
    util::{Result, Status},
};

pub const CATALOG_FILE_NAME: &str = "CATALOG";

#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub create_if_missing: bool,
    pub error_if_exists: bool,
    /// Applied to every table this handle opens
    pub table_options: TableOptions,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        DatabaseOptions {
            create_if_missing: true,
            error_if_exists: false,
            table_options: TableOptions::default(),
        }
    }
}

/// Names of the tables of a database, persisted as `CATALOG`
#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    tables: Vec<String>,
}

/// Handle on a set of tables stored in one environment
///
/// Administrative operations (create, disable, enable, drop) go through the
/// database so the catalog stays in step with the tables on storage.
pub struct Database {
    env: Arc<dyn Env>,
    options: DatabaseOptions,
    tables: RwLock<BTreeMap<String, Arc<Table>>>,
    /// Serializes catalog changes
    catalog_lock: Mutex<()>,
    /// Database-wide statistics
    statistics: Arc<Statistics>,
}

impl Database {
    /// Open the database in directory `path`
    pub fn open<P: AsRef<Path>>(path: P, options: DatabaseOptions) -> Result<Self> {
        let path = path.as_ref();
        if !options.create_if_missing && !path.join(CATALOG_FILE_NAME).exists() {
            return Err(Status::not_found(format!(
                "No database at {}",
                path.display()
            )));
        }
        let env = DiskEnv::new(path)?;
        Self::open_with_env(Arc::new(env), options)
    }

    /// Open the database stored in `env`
    pub fn open_with_env(env: Arc<dyn Env>, options: DatabaseOptions) -> Result<Self> {
        let catalog = if env.exists(CATALOG_FILE_NAME) {
            if options.error_if_exists {
                return Err(Status::invalid_argument("Database already exists"));
            }
            serde_json::from_slice::<Catalog>(&env.read_all(CATALOG_FILE_NAME)?)?
        } else if options.create_if_missing {
            let catalog = Catalog::default();
            env.write_atomic(CATALOG_FILE_NAME, &serde_json::to_vec_pretty(&catalog)?)?;
            catalog
        } else {
            return Err(Status::not_found("Database has no catalog"));
        };

        let statistics = Arc::new(Statistics::new());
        let mut tables = BTreeMap::new();
        let mut forgotten = false;
        for name in catalog.tables {
            // A drop that stopped before the catalog was rewritten
            if !env.exists(&manifest_file_name(&name)) {
                warn!("Table {name} has no manifest, removing it from the catalog");
                env.delete_dir(&name)?;
                forgotten = true;
                continue;
            }
            let table = Table::open(
                Arc::clone(&env),
                &name,
                options.table_options.clone(),
                Arc::clone(&statistics),
            )?;
            tables.insert(name, table);
        }
        info!("Opened database with {} tables", tables.len());

        let db = Database {
            env,
            options,
            tables: RwLock::new(tables),
            catalog_lock: Mutex::new(()),
            statistics,
        };
        if forgotten {
            db.write_catalog(&db.tables.read())?;
        }
        Ok(db)
    }

    fn write_catalog(&self, tables: &BTreeMap<String, Arc<Table>>) -> Result<()> {
        let catalog = Catalog {
            tables: tables.keys().cloned().collect(),
        };
        self.env
            .write_atomic(CATALOG_FILE_NAME, &serde_json::to_vec_pretty(&catalog)?)
    }

    pub fn create_table(&self, descriptor: &TableDescriptor) -> Result<Arc<Table>> {
        validate_name("table", &descriptor.name)?;
        let _guard = self.catalog_lock.lock();
        if self.tables.read().contains_key(&descriptor.name) {
            return Err(Status::schema(format!(
                "Table {} already exists",
                descriptor.name
            )));
        }

        // Not in the catalog, so nothing references what is left here
        if self.env.exists(&manifest_file_name(&descriptor.name)) {
            warn!("Removing unreferenced files of table {}", descriptor.name);
            self.env.delete_dir(&descriptor.name)?;
        }

        let table = Table::create(
            Arc::clone(&self.env),
            descriptor,
            self.options.table_options.clone(),
            Arc::clone(&self.statistics),
        )?;

        let mut tables = self.tables.read().clone();
        tables.insert(descriptor.name.clone(), Arc::clone(&table));
        if let Err(e) = self.write_catalog(&tables) {
            if let Err(cleanup) = self.env.delete_dir(&descriptor.name) {
                warn!("Failed to remove table {} after catalog error: {cleanup}", descriptor.name);
            }
            return Err(e);
        }
        *self.tables.write() = tables;
        Ok(table)
    }

    pub fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("Table {name}")))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Table names in ascending order
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn disable_table(&self, name: &str) -> Result<()> {
        self.table(name)?.disable()
    }

    pub fn enable_table(&self, name: &str) -> Result<()> {
        self.table(name)?.enable()
    }

    /// Drop a disabled table and all its data
    ///
    /// The data goes first. A catalog entry left without a manifest is
    /// removed the next time the database is opened.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let _guard = self.catalog_lock.lock();
        let table = self.table(name)?;
        table.drop_table()?;

        let mut tables = self.tables.read().clone();
        tables.remove(name);
        *self.tables.write() = tables.clone();
        self.write_catalog(&tables)
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.statistics
    }

    pub fn env(&self) -> &Arc<dyn Env> {
        &self.env
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("tables", &self.list_tables())
            .finish_non_exhaustive()
    }
}
