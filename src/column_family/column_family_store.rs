use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::{
    cell::{Cell, CellCodec, CellKey},
    column_family::{ColumnFamilyOptions, RetentionPolicy, VersionFilter},
    compaction::{CompactionPicker, Compactor},
    env::{self, Env},
    iterator::{CellIterator, MergingIterator},
    manifest::{FamilyManifest, Manifest, ManifestEdit},
    memtable::MemTable,
    segment::{Segment, build_segment, parse_segment_file_name, segment_file_name},
    statistics::Statistics,
    util::{Clock, Result, Status},
    wal::{self, Writer, parse_wal_file_name, wal_file_name},
};

/// Everything the stores of one table share
pub struct StoreContext {
    pub env: Arc<dyn Env>,
    pub codec: Arc<CellCodec>,
    pub manifest: Arc<Manifest>,
    pub stats: Arc<Statistics>,
    pub clock: Arc<dyn Clock>,
    pub wal_enabled: bool,
    pub sync_writes: bool,
}

/// What a reader sees of a family: replaced wholesale, never mutated, so a
/// reader holding one keeps a consistent set of sources
struct FamilyView {
    mem: Arc<MemTable>,
    /// Detached by a rotation and not yet published as a segment
    imm: Option<Arc<MemTable>>,
    /// Oldest first
    segments: Vec<Arc<Segment>>,
}

/// Result of one compaction of a family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionSummary {
    pub inputs: Vec<u64>,
    pub output: Option<u64>,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub cells_dropped: u64,
}

/// Storage of one column family: a memtable, at most one memtable being
/// flushed, and the family's segments
///
/// # Locking
///
/// - `write` serializes puts and covers the memtable swap, so every put
///   lands either in the detached memtable or in its replacement
/// - `maintenance` serializes flush and compaction, and is taken before
///   `write` when both are needed
/// - `view` is only held long enough to clone or replace the `Arc`
pub struct ColumnFamilyStore {
    name: Arc<str>,
    dir: String,
    options: ColumnFamilyOptions,
    policy: RetentionPolicy,
    ctx: Arc<StoreContext>,
    view: RwLock<Arc<FamilyView>>,
    /// Log receiving new writes
    write: Mutex<Option<Writer>>,
    /// Logs backing the detached memtable
    maintenance: Mutex<Vec<u64>>,
    flush_scheduled: AtomicBool,
}

impl ColumnFamilyStore {
    /// Open the family described by `family` under `table_dir`
    ///
    /// Opens the live segments, deletes files the manifest does not know
    /// about, replays surviving logs and flushes what they held.
    pub fn open(ctx: Arc<StoreContext>, table_dir: &str, family: &FamilyManifest) -> Result<Self> {
        let name = ctx
            .codec
            .family(&family.name)
            .cloned()
            .ok_or_else(|| Status::unknown_family(&family.name))?;
        let dir = env::join(table_dir, &family.name);

        let mut segments = Vec::with_capacity(family.segments.len());
        for meta in &family.segments {
            segments.push(Segment::open(
                Arc::clone(&ctx.env),
                &dir,
                meta.id,
                Arc::clone(&ctx.codec),
                Arc::clone(&ctx.stats),
            )?);
        }

        let live: HashSet<u64> = family.segments.iter().map(|s| s.id).collect();
        let mut logs = Vec::new();
        for file in ctx.env.list(&dir)? {
            let path = env::join(&dir, &file);
            if let Some(id) = parse_segment_file_name(&file) {
                ctx.manifest.mark_file_number_used(id);
                if !live.contains(&id) {
                    debug!("Deleting orphaned segment {path}");
                    ctx.env.delete(&path)?;
                }
            } else if let Some(number) = parse_wal_file_name(&file) {
                ctx.manifest.mark_file_number_used(number);
                if number < family.log_number {
                    debug!("Deleting flushed log {path}");
                    ctx.env.delete(&path)?;
                } else {
                    logs.push(number);
                }
            } else if file.ends_with(".tmp") {
                ctx.env.delete(&path)?;
            }
        }
        logs.sort_unstable();

        let recovered = Arc::new(MemTable::new());
        for number in &logs {
            let batches = wal::replay(
                ctx.env.as_ref(),
                &wal_file_name(&dir, *number),
                &ctx.codec,
                |cell| recovered.put(cell),
            )?;
            debug!("Replayed {batches} batches from log {number} of {name}");
        }

        let store = ColumnFamilyStore {
            policy: RetentionPolicy::from_options(&family.options),
            options: family.options.clone(),
            view: RwLock::new(Arc::new(FamilyView {
                mem: Arc::new(MemTable::new()),
                imm: (!logs.is_empty()).then(|| Arc::clone(&recovered)),
                segments,
            })),
            write: Mutex::new(None),
            maintenance: Mutex::new(logs),
            flush_scheduled: AtomicBool::new(false),
            name,
            dir,
            ctx,
        };

        if store.ctx.wal_enabled {
            *store.write.lock() = Some(store.new_log()?);
        }
        if !recovered.is_empty() {
            info!("Recovered {} cells of {} from logs", recovered.len(), store.dir);
        }
        {
            let mut pending_logs = store.maintenance.lock();
            store.flush_detached(&mut pending_logs)?;
        }
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ColumnFamilyOptions {
        &self.options
    }

    fn view(&self) -> Arc<FamilyView> {
        self.view.read().clone()
    }

    fn publish(&self, view: FamilyView) {
        *self.view.write() = Arc::new(view);
    }

    fn new_log(&self) -> Result<Writer> {
        let number = self.ctx.manifest.new_file_number();
        let file = self.ctx.env.create(&wal_file_name(&self.dir, number))?;
        Ok(Writer::new(file, number))
    }

    /// Check a cell can be written to this family
    pub fn validate(&self, cell: &Cell) -> Result<()> {
        if cell.family() != &*self.name {
            return Err(Status::unknown_family(cell.family()));
        }
        if cell.qualifier().is_empty() {
            return Err(Status::invalid_argument(format!(
                "Empty qualifier in family {}",
                self.name
            )));
        }
        Ok(())
    }

    /// Insert a cell; returns whether the memtable has reached its flush size
    pub fn put(&self, cell: Cell) -> Result<bool> {
        self.write_batch(&[cell])
    }

    /// Insert a tombstone hiding every version of the column up to `timestamp`
    pub fn delete(
        &self,
        row: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
    ) -> Result<bool> {
        self.put(Cell::tombstone(row, Arc::clone(&self.name), qualifier, timestamp))
    }

    /// Log and insert `cells` as one unit
    ///
    /// Every cell is validated before anything is written.
    pub fn write_batch(&self, cells: &[Cell]) -> Result<bool> {
        for cell in cells {
            self.validate(cell)?;
        }

        let mut log = self.write.lock();
        self.append_to_log(&mut log, cells)?;

        let view = self.view();
        for cell in cells {
            if cell.is_tombstone() {
                self.ctx.stats.record_delete();
            } else {
                self.ctx.stats.record_write(cell.approximate_size() as u64);
            }
            view.mem.put(cell.clone());
        }
        Ok(view.mem.size_bytes() >= self.options.write_buffer_size)
    }

    fn append_to_log(&self, log: &mut Option<Writer>, cells: &[Cell]) -> Result<()> {
        if let Some(writer) = log.as_mut() {
            let record = wal::encode_batch(&self.ctx.codec, cells)?;
            writer.add_record(&record)?;
            if self.ctx.sync_writes {
                writer.sync()?;
            }
            self.ctx.stats.record_wal_write(record.len() as u64);
        }
        Ok(())
    }

    /// Up to `max_versions` visible versions of a column, newest first
    ///
    /// `max_versions` is capped at the family's own limit. An absent column
    /// is an empty result.
    pub fn get(&self, row: &[u8], qualifier: &[u8], max_versions: usize) -> Result<Vec<Cell>> {
        self.ctx.stats.record_get();
        let policy = self.policy.capped(max_versions);
        if policy.max_versions == 0 {
            return Ok(Vec::new());
        }

        let view = self.view();
        let mut iter = merge(&view, |segment| segment.may_contain_row(row));
        let target = CellKey::first_of_column(
            Bytes::copy_from_slice(row),
            Arc::clone(&self.name),
            Bytes::copy_from_slice(qualifier),
        );
        iter.seek(&target)?;

        let mut filter = VersionFilter::for_read(policy, self.ctx.clock.now_millis());
        let mut cells = Vec::new();
        while let Some(cell) = iter.current() {
            if &cell.row()[..] != row || &cell.qualifier()[..] != qualifier {
                break;
            }
            if filter.admit(cell) {
                cells.push(cell.clone());
                if cells.len() >= policy.max_versions {
                    break;
                }
            }
            iter.next()?;
        }
        Ok(cells)
    }

    /// Visible cells of one row in this family
    pub fn get_row(&self, row: &[u8], max_versions: usize) -> Result<Vec<Cell>> {
        self.ctx.stats.record_get();
        let mut end = row.to_vec();
        end.push(0);
        let mut scanner = self.scan(Some(row), Some(&end[..]), max_versions)?;
        match scanner.next() {
            Some(Ok((_, cells))) => Ok(cells),
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }

    /// Rows in `[start, end)` with their visible cells, in row order
    ///
    /// The scanner keeps the sources it started with, so it is unaffected by
    /// later flushes and compactions. Calling `scan` again restarts.
    pub fn scan(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        max_versions: usize,
    ) -> Result<FamilyScanner> {
        let view = self.view();
        let mut iter = merge(&view, |segment| segment.overlaps(start, end));
        match start {
            Some(start) => iter.seek(&CellKey::first_of_row(Bytes::copy_from_slice(start)))?,
            None => iter.seek_to_first()?,
        };

        Ok(FamilyScanner {
            iter,
            filter: VersionFilter::for_read(
                self.policy.capped(max_versions),
                self.ctx.clock.now_millis(),
            ),
            end: end.map(Bytes::copy_from_slice),
            done: max_versions == 0,
        })
    }

    pub fn memtable_size(&self) -> usize {
        self.view().mem.size_bytes()
    }

    pub fn num_segments(&self) -> usize {
        self.view().segments.len()
    }

    /// Ids of the live segments, oldest first
    pub fn segment_ids(&self) -> Vec<u64> {
        self.view().segments.iter().map(|s| s.id()).collect()
    }

    pub fn needs_compaction(&self) -> bool {
        CompactionPicker::from_options(&self.options).needs_compaction(self.num_segments())
    }

    /// Detach the memtable for flushing and install an empty one
    ///
    /// Returns `None` when the memtable is empty. Fails if an earlier
    /// snapshot has not been flushed yet.
    pub fn snapshot_and_clear(&self) -> Result<Option<Arc<MemTable>>> {
        let mut pending_logs = self.maintenance.lock();
        self.rotate(&mut pending_logs)
    }

    fn rotate(&self, pending_logs: &mut Vec<u64>) -> Result<Option<Arc<MemTable>>> {
        let mut log = self.write.lock();
        let view = self.view();
        if view.imm.is_some() {
            return Err(Status::invalid_argument(format!(
                "{}: previous memtable is still being flushed",
                self.dir
            )));
        }
        if view.mem.is_empty() {
            return Ok(None);
        }

        if log.is_some() {
            let next = self.new_log()?;
            if let Some(old) = log.replace(next) {
                pending_logs.push(old.number());
            }
        }

        let detached = Arc::clone(&view.mem);
        self.publish(FamilyView {
            mem: Arc::new(MemTable::new()),
            imm: Some(Arc::clone(&detached)),
            segments: view.segments.clone(),
        });
        Ok(Some(detached))
    }

    /// Write everything buffered in memory to segments
    ///
    /// A memtable left detached by an earlier failed flush goes first. On
    /// failure the detached memtable stays readable and the next flush
    /// retries it.
    pub fn flush(&self) -> Result<()> {
        let mut pending_logs = self.maintenance.lock();
        self.flush_detached(&mut pending_logs)?;
        if self.rotate(&mut pending_logs)?.is_some() {
            self.flush_detached(&mut pending_logs)?;
        }
        Ok(())
    }

    fn flush_detached(&self, pending_logs: &mut Vec<u64>) -> Result<()> {
        let view = self.view();
        let Some(imm) = view.imm.clone() else {
            return Ok(());
        };

        let mut segment = None;
        if !imm.is_empty() {
            let id = self.ctx.manifest.new_file_number();
            let meta = build_segment(
                Arc::clone(&self.ctx.env),
                &self.dir,
                id,
                Arc::clone(&self.ctx.codec),
                self.options.index_interval,
                self.options.compression,
                imm.scan(None, None).map(Ok),
            )?;
            let opened = Segment::open(
                Arc::clone(&self.ctx.env),
                &self.dir,
                id,
                Arc::clone(&self.ctx.codec),
                Arc::clone(&self.ctx.stats),
            )
            .inspect_err(|_| self.delete_file(&segment_file_name(&self.dir, id)))?;

            let mut edit = ManifestEdit::new();
            edit.add_segment(&self.name, meta);
            if let Some(number) = self.write.lock().as_ref().map(Writer::number) {
                edit.set_log_number(&self.name, number);
            }
            if let Err(e) = self.ctx.manifest.log_and_apply(edit) {
                opened.mark_obsolete();
                return Err(e);
            }
            segment = Some(opened);
        }

        let view = self.view();
        let mut segments = view.segments.clone();
        if let Some(segment) = &segment {
            self.ctx.stats.record_flush(segment.file_size());
            info!(
                "Flushed {} cells of {} to segment {} ({} bytes)",
                segment.num_cells(),
                self.dir,
                segment.id(),
                segment.file_size()
            );
            segments.push(Arc::clone(segment));
        }
        self.publish(FamilyView {
            mem: Arc::clone(&view.mem),
            imm: None,
            segments,
        });

        for number in pending_logs.drain(..) {
            self.delete_file(&wal_file_name(&self.dir, number));
        }
        Ok(())
    }

    /// Merge segments of this family
    ///
    /// With `major` the memtable is flushed, every segment is rewritten and
    /// tombstones are purged; otherwise the oldest segments are merged if the
    /// picker asks for it. A purged tombstone that still covers a cell
    /// written to the memtable meanwhile is put back into the memtable.
    /// Returns `None` when there was nothing to do. On failure the family
    /// is left exactly as it was.
    pub fn compact(&self, major: bool) -> Result<Option<CompactionSummary>> {
        let mut pending_logs = self.maintenance.lock();
        if major {
            self.flush_detached(&mut pending_logs)?;
            if self.rotate(&mut pending_logs)?.is_some() {
                self.flush_detached(&mut pending_logs)?;
            }
        }
        let view = self.view();

        let count = if major {
            view.segments.len()
        } else {
            let sizes: Vec<u64> = view.segments.iter().map(|s| s.file_size()).collect();
            CompactionPicker::from_options(&self.options)
                .pick(&sizes)
                .unwrap_or(0)
        };
        if count == 0 {
            return Ok(None);
        }

        let inputs: Vec<Arc<Segment>> = view.segments[..count].iter().rev().cloned().collect();
        let input_ids: Vec<u64> = view.segments[..count].iter().map(|s| s.id()).collect();
        let drop_tombstones = major;

        let compactor = Compactor::new(
            Arc::clone(&self.ctx.env),
            self.dir.clone(),
            Arc::clone(&self.ctx.codec),
            self.options.clone(),
        );
        let output_id = self.ctx.manifest.new_file_number();
        let now = self.ctx.clock.now_millis();
        let output = compactor.run(output_id, &inputs, now, drop_tombstones)?;

        let segment = match &output.meta {
            Some(_) => Some(
                Segment::open(
                    Arc::clone(&self.ctx.env),
                    &self.dir,
                    output_id,
                    Arc::clone(&self.ctx.codec),
                    Arc::clone(&self.ctx.stats),
                )
                .inspect_err(|_| self.delete_file(&segment_file_name(&self.dir, output_id)))?,
            ),
            None => None,
        };

        // Writers stay out until the new segment list is published
        let mut log = self.write.lock();
        let current = self.view();
        if let Err(e) = self.carry_tombstones(&mut log, &current, &output.purged_tombstones) {
            if let Some(segment) = &segment {
                segment.mark_obsolete();
            }
            return Err(e);
        }

        let mut edit = ManifestEdit::new();
        edit.replace_segments(&self.name, input_ids.clone(), output.meta.clone());
        if let Err(e) = self.ctx.manifest.log_and_apply(edit) {
            if let Some(segment) = &segment {
                segment.mark_obsolete();
            }
            return Err(e);
        }

        let mut segments: Vec<Arc<Segment>> = segment.iter().cloned().collect();
        segments.extend(view.segments[count..].iter().cloned());
        self.publish(FamilyView {
            mem: Arc::clone(&current.mem),
            imm: current.imm.clone(),
            segments,
        });
        drop(log);

        // Files go away once the last scanner still reading them is dropped
        for input in &inputs {
            input.mark_obsolete();
        }

        let bytes_written = segment.as_ref().map_or(0, |s| s.file_size());
        self.ctx
            .stats
            .record_compaction(output.bytes_read, bytes_written, output.cells_dropped);
        info!(
            "Compacted {} segments of {} into {:?}: {} -> {} bytes, {} cells dropped",
            count,
            self.dir,
            segment.as_ref().map(|s| s.id()),
            output.bytes_read,
            bytes_written,
            output.cells_dropped
        );

        Ok(Some(CompactionSummary {
            inputs: input_ids,
            output: segment.as_ref().map(|s| s.id()),
            bytes_read: output.bytes_read,
            bytes_written,
            cells_dropped: output.cells_dropped,
        }))
    }

    /// Log and reinsert every purged tombstone that hides a cell in the
    /// memtables of `view`; called with the write lock held
    fn carry_tombstones(
        &self,
        log: &mut Option<Writer>,
        view: &FamilyView,
        purged: &[Cell],
    ) -> Result<()> {
        let covers_buffered = |tombstone: &Cell| {
            std::iter::once(&view.mem).chain(&view.imm).any(|mem| {
                mem.get(tombstone.row(), &self.name, tombstone.qualifier())
                    .iter()
                    .any(|c| !c.is_tombstone() && c.timestamp() <= tombstone.timestamp())
            })
        };
        let carried: Vec<Cell> = purged.iter().filter(|t| covers_buffered(*t)).cloned().collect();
        if carried.is_empty() {
            return Ok(());
        }

        self.append_to_log(log, &carried)?;
        debug!("Kept {} purged tombstones of {} in the memtable", carried.len(), self.dir);
        for tombstone in carried {
            view.mem.put(tombstone);
        }
        Ok(())
    }

    /// Set the scheduled flag; false if a flush was already scheduled
    pub(crate) fn try_schedule_flush(&self) -> bool {
        !self.flush_scheduled.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn clear_flush_scheduled(&self) {
        self.flush_scheduled.store(false, Ordering::Release);
    }

    fn delete_file(&self, name: &str) {
        if let Err(e) = self.ctx.env.delete(name) {
            warn!("Failed to delete {name}: {e}");
        }
    }
}

impl std::fmt::Debug for ColumnFamilyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let view = self.view();
        f.debug_struct("ColumnFamilyStore")
            .field("dir", &self.dir)
            .field("memtable_size", &view.mem.size_bytes())
            .field("flushing", &view.imm.is_some())
            .field("segments", &view.segments.len())
            .finish()
    }
}

/// Merge of every source of `view`, newest first, skipping segments
/// rejected by `wanted`
fn merge(view: &FamilyView, wanted: impl Fn(&Segment) -> bool) -> MergingIterator {
    let mut children: Vec<Box<dyn CellIterator>> = vec![Box::new(view.mem.iter())];
    if let Some(imm) = &view.imm {
        children.push(Box::new(imm.iter()));
    }
    for segment in view.segments.iter().rev() {
        if wanted(segment) {
            children.push(Box::new(segment.iter()));
        }
    }
    MergingIterator::new(children)
}

/// Rows of one family with their visible cells
///
/// Holds one row in memory at a time. A read error ends the scan.
pub struct FamilyScanner {
    iter: MergingIterator,
    filter: VersionFilter,
    end: Option<Bytes>,
    done: bool,
}

impl Iterator for FamilyScanner {
    type Item = Result<(Bytes, Vec<Cell>)>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some(row) = self.iter.current().map(|c| c.row().clone()) else {
                self.done = true;
                break;
            };
            if self.end.as_ref().is_some_and(|end| row >= *end) {
                self.done = true;
                break;
            }

            let mut cells = Vec::new();
            while let Some(cell) = self.iter.current() {
                if *cell.row() != row {
                    break;
                }
                if self.filter.admit(cell) {
                    cells.push(cell.clone());
                }
                if let Err(e) = self.iter.next() {
                    self.done = true;
                    return Some(Err(e));
                }
            }

            if !cells.is_empty() {
                return Some(Ok((row, cells)));
            }
        }
        None
    }
}
