use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use bytes::Bytes;
use log::info;
use parking_lot::{RwLock, RwLockReadGuard};
use rayon::prelude::*;

use crate::{
    cell::{Cell, CellCodec},
    column_family::{ColumnFamilyStore, StoreContext},
    compaction::BackgroundScheduler,
    env::Env,
    manifest::{Manifest, ManifestEdit, TableManifest, manifest_file_name},
    statistics::Statistics,
    table::{
        Delete, Get, Put, RowResult, ScanOptions, TableDescriptor, TableOptions, TableScanner,
        TableState,
    },
    util::{Result, Status},
};

/// Check a table or family name: non-empty, `[A-Za-z0-9_.-]`, not `.`/`..`
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(Status::schema(format!("Invalid {kind} name {name:?}")))
    }
}

/// A table: a fixed set of column families sharing one manifest
///
/// Writes are checked against the schema before anything is applied. A
/// multi-family put is split per family; each family's part is logged and
/// applied as one unit.
pub struct Table {
    name: String,
    env: Arc<dyn Env>,
    manifest: Arc<Manifest>,
    /// Keyed by name, so iteration follows cell order
    families: BTreeMap<String, Arc<ColumnFamilyStore>>,
    options: TableOptions,
    stats: Arc<Statistics>,
    state: RwLock<TableState>,
    scheduler: Option<BackgroundScheduler>,
}

impl Table {
    /// Create a new table from `descriptor`
    ///
    /// Every family store exists before the table is returned.
    pub fn create(
        env: Arc<dyn Env>,
        descriptor: &TableDescriptor,
        options: TableOptions,
        stats: Arc<Statistics>,
    ) -> Result<Arc<Table>> {
        validate_name("table", &descriptor.name)?;
        if descriptor.families.is_empty() {
            return Err(Status::schema(format!(
                "Table {} declares no column families",
                descriptor.name
            )));
        }
        let mut seen = HashSet::new();
        for family in &descriptor.families {
            validate_name("column family", &family.name)?;
            if !seen.insert(family.name.as_str()) {
                return Err(Status::schema(format!(
                    "Column family {} declared twice in {}",
                    family.name, descriptor.name
                )));
            }
            family.options.validate()?;
        }

        let initial = TableManifest::new(&descriptor.name, &descriptor.families);
        let manifest = Manifest::create(Arc::clone(&env), &descriptor.name, initial)?;
        let table = Self::open_with_manifest(env, manifest, options, stats)?;
        info!(
            "Created table {} with families {:?}",
            table.name,
            table.family_names()
        );
        Ok(table)
    }

    /// Open an existing table from its manifest
    pub fn open(
        env: Arc<dyn Env>,
        name: &str,
        options: TableOptions,
        stats: Arc<Statistics>,
    ) -> Result<Arc<Table>> {
        validate_name("table", name)?;
        let manifest = Manifest::open(Arc::clone(&env), name)?;
        let table = Self::open_with_manifest(env, manifest, options, stats)?;
        info!("Opened table {} ({:?})", table.name, table.state());
        Ok(table)
    }

    fn open_with_manifest(
        env: Arc<dyn Env>,
        manifest: Manifest,
        options: TableOptions,
        stats: Arc<Statistics>,
    ) -> Result<Arc<Table>> {
        let manifest = Arc::new(manifest);
        let state = manifest.current();
        let names: Vec<&str> = state.families.iter().map(|f| f.name.as_str()).collect();

        let ctx = Arc::new(StoreContext {
            env: Arc::clone(&env),
            codec: Arc::new(CellCodec::new(&names)),
            manifest: Arc::clone(&manifest),
            stats: Arc::clone(&stats),
            clock: Arc::clone(&options.clock),
            wal_enabled: options.wal_enabled,
            sync_writes: options.sync_writes,
        });

        let mut families = BTreeMap::new();
        for family in &state.families {
            let store = ColumnFamilyStore::open(Arc::clone(&ctx), &state.name, family)?;
            families.insert(family.name.clone(), Arc::new(store));
        }

        let scheduler = if options.background_jobs {
            Some(BackgroundScheduler::start(&state.name, Arc::clone(&stats))?)
        } else {
            None
        };

        Ok(Arc::new(Table {
            name: state.name.clone(),
            env,
            manifest,
            families,
            options,
            stats,
            state: RwLock::new(if state.enabled {
                TableState::Enabled
            } else {
                TableState::Disabled
            }),
            scheduler,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TableState {
        *self.state.read()
    }

    pub fn family_names(&self) -> Vec<&str> {
        self.families.keys().map(String::as_str).collect()
    }

    pub fn descriptor(&self) -> TableDescriptor {
        TableDescriptor::new(self.name.clone(), self.manifest.current().descriptors())
    }

    pub fn column_family(&self, name: &str) -> Result<&Arc<ColumnFamilyStore>> {
        self.families
            .get(name)
            .ok_or_else(|| Status::unknown_family(name))
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.stats
    }

    /// Hold the state lock for a write; in-flight writes finish before a
    /// disable takes effect
    fn writable(&self) -> Result<RwLockReadGuard<'_, TableState>> {
        let state = self.state.read();
        match *state {
            TableState::Enabled => Ok(state),
            other => Err(Status::table_state(format!(
                "Table {} is {other:?}",
                self.name
            ))),
        }
    }

    fn readable(&self) -> Result<RwLockReadGuard<'_, TableState>> {
        let state = self.state.read();
        if *state == TableState::Dropped {
            return Err(Status::table_state(format!("Table {} is dropped", self.name)));
        }
        Ok(state)
    }

    fn cells_of(&self, put: &Put, batches: &mut BTreeMap<String, Vec<Cell>>) -> Result<()> {
        let timestamp = put
            .timestamp
            .unwrap_or_else(|| self.options.clock.now_millis());
        for (family, qualifier, value) in &put.columns {
            let store = self.column_family(family)?;
            let cell = Cell::put(
                put.row.clone(),
                family.as_str(),
                qualifier.clone(),
                timestamp,
                value.clone(),
            );
            store.validate(&cell)?;
            batches.entry(family.clone()).or_default().push(cell);
        }
        Ok(())
    }

    pub fn put(&self, put: &Put) -> Result<()> {
        self.put_all(std::slice::from_ref(put))
    }

    /// Apply several puts after validating every one of them
    pub fn put_all(&self, puts: &[Put]) -> Result<()> {
        let _state = self.writable()?;
        let mut batches = BTreeMap::new();
        for put in puts {
            self.cells_of(put, &mut batches)?;
        }
        self.apply(batches)
    }

    fn apply(&self, batches: BTreeMap<String, Vec<Cell>>) -> Result<()> {
        for (family, cells) in batches {
            let store = self.column_family(&family)?;
            if store.write_batch(&cells)? {
                self.flush_in_background(store)?;
            }
        }
        Ok(())
    }

    fn flush_in_background(&self, store: &Arc<ColumnFamilyStore>) -> Result<()> {
        match &self.scheduler {
            Some(scheduler) => scheduler.schedule_flush(store),
            None => {
                store.flush()?;
                self.compact_if_needed(store)?;
            },
        }
        Ok(())
    }

    fn compact_if_needed(&self, store: &Arc<ColumnFamilyStore>) -> Result<()> {
        match &self.scheduler {
            Some(scheduler) => scheduler.schedule_compaction(store),
            None => while store.needs_compaction() && store.compact(false)?.is_some() {},
        }
        Ok(())
    }

    /// Read one row
    ///
    /// Reads work on disabled tables. A row with no visible cells gives an
    /// empty result.
    pub fn get(&self, get: &Get) -> Result<RowResult> {
        let _state = self.readable()?;

        // family -> qualifiers, empty meaning the whole family
        let mut wanted: BTreeMap<&str, Vec<&Bytes>> = BTreeMap::new();
        for family in &get.families {
            self.column_family(family)?;
            wanted.entry(family.as_str()).or_default();
        }
        for (family, qualifier) in &get.columns {
            self.column_family(family)?;
            wanted.entry(family.as_str()).or_default().push(qualifier);
        }
        if wanted.is_empty() {
            wanted = self.families.keys().map(|f| (f.as_str(), Vec::new())).collect();
        }
        // A family requested whole wins over a column list for it
        for family in &get.families {
            if let Some(qualifiers) = wanted.get_mut(family.as_str()) {
                qualifiers.clear();
            }
        }

        let mut cells = Vec::new();
        for (family, mut qualifiers) in wanted {
            let store = self.column_family(family)?;
            if qualifiers.is_empty() {
                cells.extend(store.get_row(&get.row, get.max_versions)?);
            } else {
                qualifiers.sort();
                qualifiers.dedup();
                for qualifier in qualifiers {
                    cells.extend(store.get(&get.row, qualifier, get.max_versions)?);
                }
            }
        }
        Ok(RowResult::new(get.row.clone(), cells))
    }

    /// Write tombstones for the columns, families or whole row in `delete`
    ///
    /// Deleting a family tombstones each of its columns visible at the time
    /// of the call.
    pub fn delete(&self, delete: &Delete) -> Result<()> {
        let _state = self.writable()?;
        let timestamp = delete
            .timestamp
            .unwrap_or_else(|| self.options.clock.now_millis());

        for family in &delete.families {
            self.column_family(family)?;
        }
        let mut batches: BTreeMap<String, Vec<Cell>> = BTreeMap::new();
        for (family, qualifier) in &delete.columns {
            let store = self.column_family(family)?;
            let cell = Cell::tombstone(
                delete.row.clone(),
                family.as_str(),
                qualifier.clone(),
                timestamp,
            );
            store.validate(&cell)?;
            batches.entry(family.clone()).or_default().push(cell);
        }

        let whole: Vec<&String> = if delete.families.is_empty() && delete.columns.is_empty() {
            self.families.keys().collect()
        } else {
            delete.families.iter().collect()
        };
        for family in whole {
            let store = self.column_family(family)?;
            let mut qualifiers: Vec<Bytes> = store
                .get_row(&delete.row, 1)?
                .into_iter()
                .map(|c| c.qualifier().clone())
                .collect();
            qualifiers.dedup();
            let batch = batches.entry(family.clone()).or_default();
            for qualifier in qualifiers {
                batch.push(Cell::tombstone(
                    delete.row.clone(),
                    family.as_str(),
                    qualifier,
                    timestamp,
                ));
            }
        }

        batches.retain(|_, cells| !cells.is_empty());
        self.apply(batches)
    }

    /// Tombstone one column at the current time
    pub fn delete_column(
        &self,
        row: impl Into<Bytes>,
        family: &str,
        qualifier: impl Into<Bytes>,
    ) -> Result<()> {
        self.delete(&Delete::new(row).add_column(family, qualifier))
    }

    /// Rows in the range with their visible cells, joined across families
    pub fn scan(&self, options: &ScanOptions) -> Result<TableScanner> {
        let _state = self.readable()?;

        let families: Vec<&Arc<ColumnFamilyStore>> = if options.families.is_empty() {
            self.families.values().collect()
        } else {
            let mut names: Vec<&String> = options.families.iter().collect();
            names.sort();
            names.dedup();
            names
                .into_iter()
                .map(|f| self.column_family(f))
                .collect::<Result<_>>()?
        };

        let start = options.start_row.as_deref();
        let stop = options.stop_row.as_deref();
        let scanners = families
            .into_iter()
            .map(|store| store.scan(start, stop, options.max_versions))
            .collect::<Result<Vec<_>>>()?;
        Ok(TableScanner::new(scanners, Arc::clone(&self.stats)))
    }

    /// Flush every family and wait for it
    ///
    /// Families that end up over their compaction trigger get a compaction,
    /// queued on the worker or run inline without one.
    pub fn flush(&self) -> Result<()> {
        let _state = self.readable()?;
        self.flush_all()?;
        for store in self.families.values() {
            if store.needs_compaction() {
                self.compact_if_needed(store)?;
            }
        }
        Ok(())
    }

    fn flush_all(&self) -> Result<()> {
        for store in self.families.values() {
            store.flush()?;
        }
        Ok(())
    }

    /// Flush, then rewrite every family into a single segment, purging
    /// tombstones and expired versions. Families run in parallel.
    pub fn compact(&self) -> Result<()> {
        let _state = self.readable()?;
        self.flush_all()?;
        self.families
            .par_iter()
            .map(|(_, store)| store.compact(true).map(|_| ()))
            .collect::<Result<Vec<()>>>()?;
        info!("Compacted table {}", self.name);
        Ok(())
    }

    /// Reject new writes, wait for in-flight ones, and flush
    pub fn disable(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state != TableState::Enabled {
                return Err(Status::table_state(format!(
                    "Cannot disable table {}: {:?}",
                    self.name, *state
                )));
            }
            let mut edit = ManifestEdit::new();
            edit.set_enabled(false);
            self.manifest.log_and_apply(edit)?;
            *state = TableState::Disabled;
        }

        if let Some(scheduler) = &self.scheduler {
            scheduler.wait_idle();
        }
        self.flush_all()?;
        info!("Disabled table {}", self.name);
        Ok(())
    }

    pub fn enable(&self) -> Result<()> {
        let mut state = self.state.write();
        if *state != TableState::Disabled {
            return Err(Status::table_state(format!(
                "Cannot enable table {}: {:?}",
                self.name, *state
            )));
        }
        let mut edit = ManifestEdit::new();
        edit.set_enabled(true);
        self.manifest.log_and_apply(edit)?;
        *state = TableState::Enabled;
        info!("Enabled table {}", self.name);
        Ok(())
    }

    /// Delete all data of a disabled table; the handle is unusable afterwards
    pub fn drop_table(&self) -> Result<()> {
        let mut state = self.state.write();
        if *state != TableState::Disabled {
            return Err(Status::table_state(format!(
                "Table {} must be disabled before it is dropped, it is {:?}",
                self.name, *state
            )));
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
        // Without its manifest a half-deleted table is never reopened
        let manifest = manifest_file_name(&self.name);
        if self.env.exists(&manifest) {
            self.env.delete(&manifest)?;
        }
        self.env.delete_dir(&self.name)?;
        *state = TableState::Dropped;
        info!("Dropped table {}", self.name);
        Ok(())
    }

    /// Wait until all background flushes and compactions scheduled so far are done
    pub fn wait_for_background_jobs(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.wait_idle();
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("families", &self.families)
            .finish()
    }
}
