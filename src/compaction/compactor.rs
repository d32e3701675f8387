use std::sync::Arc;

use log::debug;

use crate::{
    cell::{Cell, CellCodec},
    column_family::{ColumnFamilyOptions, RetentionPolicy, VersionFilter},
    env::Env,
    iterator::{CellIterator, MergingIterator},
    segment::{Segment, SegmentMeta, build_segment, segment_file_name},
    util::Result,
};

/// Result from merging one set of segments
#[derive(Debug)]
pub struct CompactionOutput {
    /// `None` when retention dropped every input cell
    pub meta: Option<SegmentMeta>,
    pub bytes_read: u64,
    pub cells_read: u64,
    pub cells_dropped: u64,
    /// Newest tombstone of each column whose tombstones were purged
    pub purged_tombstones: Vec<Cell>,
}

/// Merges segments of one family into a single new segment
pub struct Compactor {
    env: Arc<dyn Env>,
    dir: String,
    codec: Arc<CellCodec>,
    options: ColumnFamilyOptions,
}

impl Compactor {
    pub fn new(
        env: Arc<dyn Env>,
        dir: impl Into<String>,
        codec: Arc<CellCodec>,
        options: ColumnFamilyOptions,
    ) -> Self {
        Compactor {
            env,
            dir: dir.into(),
            codec,
            options,
        }
    }

    /// Merge `inputs` (newest first) into segment `output_id`
    ///
    /// Tombstones are dropped only when `drop_tombstones` is set, which is
    /// correct only if the inputs are every segment of the family. Dropped
    /// tombstones are returned so the caller can keep those still covering
    /// cells outside the inputs. On error nothing is left behind and the
    /// inputs are untouched.
    pub fn run(
        &self,
        output_id: u64,
        inputs: &[Arc<Segment>],
        now: i64,
        drop_tombstones: bool,
    ) -> Result<CompactionOutput> {
        let children: Vec<Box<dyn CellIterator>> = inputs
            .iter()
            .map(|segment| Box::new(segment.iter()) as Box<dyn CellIterator>)
            .collect();

        let mut merged = RetainedCells {
            iter: MergingIterator::new(children),
            filter: VersionFilter::for_compaction(
                RetentionPolicy::from_options(&self.options),
                now,
                drop_tombstones,
            ),
            started: false,
            cells_read: 0,
        };

        let meta = build_segment(
            Arc::clone(&self.env),
            &self.dir,
            output_id,
            Arc::clone(&self.codec),
            self.options.index_interval,
            self.options.compression,
            &mut merged,
        )?;

        let meta = if meta.num_cells == 0 {
            self.env.delete(&segment_file_name(&self.dir, output_id))?;
            None
        } else {
            Some(meta)
        };

        debug!(
            "Compacted {} segments of {} into {:?}: read {} cells, dropped {}",
            inputs.len(),
            self.dir,
            meta.as_ref().map(|m| m.id),
            merged.cells_read,
            merged.filter.dropped()
        );

        Ok(CompactionOutput {
            meta,
            bytes_read: inputs.iter().map(|s| s.file_size()).sum(),
            cells_read: merged.cells_read,
            cells_dropped: merged.filter.dropped(),
            purged_tombstones: merged.filter.take_purged(),
        })
    }
}

/// The merged input stream with retention applied
struct RetainedCells {
    iter: MergingIterator,
    filter: VersionFilter,
    started: bool,
    cells_read: u64,
}

impl Iterator for RetainedCells {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = if self.started {
                self.iter.next()
            } else {
                self.started = true;
                self.iter.seek_to_first()
            };
            if let Err(e) = step {
                return Some(Err(e));
            }

            let cell = self.iter.current()?.clone();
            self.cells_read += 1;
            if self.filter.admit(&cell) {
                return Some(Ok(cell));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compression::CompressionType, env::MemEnv, statistics::Statistics};

    const DIR: &str = "t/cf";

    struct Fixture {
        env: MemEnv,
        codec: Arc<CellCodec>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                env: MemEnv::new(),
                codec: Arc::new(CellCodec::new(&["cf"])),
            }
        }

        fn env(&self) -> Arc<dyn Env> {
            Arc::new(self.env.clone())
        }

        fn segment(&self, id: u64, cells: Vec<Cell>) -> Arc<Segment> {
            let mut cells = cells;
            cells.sort_by(|a, b| a.cmp_key(b));
            build_segment(
                self.env(),
                DIR,
                id,
                self.codec.clone(),
                4,
                CompressionType::None,
                cells.into_iter().map(Ok),
            )
            .unwrap();
            Segment::open(self.env(), DIR, id, self.codec.clone(), Arc::new(Statistics::new()))
                .unwrap()
        }

        fn compactor(&self, max_versions: usize) -> Compactor {
            let options = ColumnFamilyOptions {
                max_versions,
                ..Default::default()
            };
            Compactor::new(self.env(), DIR, self.codec.clone(), options)
        }
    }

    fn read(segment: &Arc<Segment>) -> Vec<Cell> {
        segment.range_scan(None, None).map(|c| c.unwrap()).collect()
    }

    #[test]
    fn test_merge_keeps_newest_versions() {
        let fx = Fixture::new();
        let old = fx.segment(1, (1..=3).map(|ts| Cell::put("r", "cf", "q", ts, "old")).collect());
        let new = fx.segment(2, (4..=6).map(|ts| Cell::put("r", "cf", "q", ts, "new")).collect());

        let output = fx.compactor(2).run(3, &[new, old], 0, false).unwrap();
        assert_eq!(output.cells_read, 6);
        assert_eq!(output.cells_dropped, 4);

        let merged = fx.segment_reopen(3);
        let timestamps: Vec<_> = read(&merged).iter().map(Cell::timestamp).collect();
        assert_eq!(timestamps, vec![6, 5]);
    }

    #[test]
    fn test_tombstones_survive_partial_compaction() {
        let fx = Fixture::new();
        let old = fx.segment(1, vec![Cell::put("r", "cf", "q", 1, "v")]);
        let new = fx.segment(2, vec![Cell::tombstone("r", "cf", "q", 2)]);

        fx.compactor(1).run(3, &[new.clone(), old.clone()], 0, false).unwrap();
        let cells = read(&fx.segment_reopen(3));
        assert_eq!(cells.len(), 1);
        assert!(cells[0].is_tombstone());

        // Rewriting everything purges the tombstone and what it covered
        let output = fx.compactor(1).run(4, &[new, old], 0, true).unwrap();
        assert!(output.meta.is_none());
        assert_eq!(output.purged_tombstones.len(), 1);
        assert_eq!(output.purged_tombstones[0].timestamp(), 2);
        assert!(!fx.env.exists(&segment_file_name(DIR, 4)));
    }

    #[test]
    fn test_failure_leaves_no_output() {
        let fx = Fixture::new();
        let a = fx.segment(1, vec![Cell::put("a", "cf", "q", 1, "v")]);
        let b = fx.segment(2, vec![Cell::put("b", "cf", "q", 1, "v")]);

        fx.env.set_fail_writes(true);
        assert!(fx.compactor(1).run(3, &[b, a], 0, false).is_err());
        fx.env.set_fail_writes(false);
        assert!(!fx.env.exists(&segment_file_name(DIR, 3)));
        assert!(fx.env.exists(&segment_file_name(DIR, 1)));
    }

    impl Fixture {
        fn segment_reopen(&self, id: u64) -> Arc<Segment> {
            Segment::open(self.env(), DIR, id, self.codec.clone(), Arc::new(Statistics::new()))
                .unwrap()
        }
    }
}
