//! Durable per-table metadata.
//!
//! A table's manifest is one JSON document (`{table}/MANIFEST`) holding the
//! schema, the enabled flag, every family's live segments and the next file
//! number. Changes are expressed as [`ManifestEdit`]s; [`Manifest::log_and_apply`]
//! computes the new state, writes it to a temp file, syncs and renames it over
//! the old one, and only then makes it current. A crash at any point leaves
//! either the old or the new document on storage.

mod manifest_edit;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use log::debug;
use parking_lot::{Mutex, RwLock};

pub use manifest_edit::{FamilyManifest, ManifestEdit, SegmentChange, TableManifest};

use crate::{
    env::{self, Env},
    util::{Result, Status},
};

pub const MANIFEST_FILE_NAME: &str = "MANIFEST";

pub fn manifest_file_name(table_dir: &str) -> String {
    env::join(table_dir, MANIFEST_FILE_NAME)
}

/// Current manifest of one table and the file number allocator
pub struct Manifest {
    env: Arc<dyn Env>,
    file_name: String,
    current: RwLock<Arc<TableManifest>>,
    /// Next file number to allocate
    next_file_number: AtomicU64,
    /// Serializes log_and_apply
    write_lock: Mutex<()>,
}

impl Manifest {
    /// Persist `initial` as a new manifest in `table_dir`
    pub fn create(env: Arc<dyn Env>, table_dir: &str, initial: TableManifest) -> Result<Self> {
        let file_name = manifest_file_name(table_dir);
        if env.exists(&file_name) {
            return Err(Status::invalid_argument(format!("{file_name} already exists")));
        }
        write(env.as_ref(), &file_name, &initial)?;
        Ok(Self::with_state(env, file_name, initial))
    }

    pub fn open(env: Arc<dyn Env>, table_dir: &str) -> Result<Self> {
        let file_name = manifest_file_name(table_dir);
        if !env.exists(&file_name) {
            return Err(Status::not_found(format!("No manifest at {file_name}")));
        }
        let state: TableManifest = serde_json::from_slice(&env.read_all(&file_name)?)?;
        debug!(
            "Loaded {file_name}: {} families, next file number {}",
            state.families.len(),
            state.next_file_number
        );
        Ok(Self::with_state(env, file_name, state))
    }

    fn with_state(env: Arc<dyn Env>, file_name: String, state: TableManifest) -> Self {
        Manifest {
            env,
            file_name,
            next_file_number: AtomicU64::new(state.next_file_number.max(1)),
            current: RwLock::new(Arc::new(state)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn current(&self) -> Arc<TableManifest> {
        self.current.read().clone()
    }

    /// Allocate a file number for a segment or log
    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::SeqCst)
    }

    /// Make sure numbers up to `num` are never handed out again
    pub fn mark_file_number_used(&self, num: u64) {
        self.next_file_number.fetch_max(num + 1, Ordering::SeqCst);
    }

    /// Apply an edit and persist the result before making it current
    pub fn log_and_apply(&self, mut edit: ManifestEdit) -> Result<Arc<TableManifest>> {
        let _guard = self.write_lock.lock();

        if edit.next_file_number.is_none() {
            edit.set_next_file_number(self.next_file_number.load(Ordering::SeqCst));
        }

        let next = Arc::new(edit.apply(&self.current())?);
        write(self.env.as_ref(), &self.file_name, &next)?;
        *self.current.write() = Arc::clone(&next);
        Ok(next)
    }
}

fn write(env: &dyn Env, file_name: &str, state: &TableManifest) -> Result<()> {
    let data = serde_json::to_vec_pretty(state)?;
    env.write_atomic(file_name, &data)
}
