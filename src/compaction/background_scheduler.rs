use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{debug, error};
use parking_lot::Mutex;

use crate::{
    column_family::ColumnFamilyStore,
    statistics::Statistics,
    util::{Result, Status},
};

enum Job {
    Flush(Arc<ColumnFamilyStore>),
    Compact(Arc<ColumnFamilyStore>),
    /// Acknowledged once every job queued before it has run
    Barrier(flume::Sender<()>),
    Shutdown,
}

/// One worker thread running the flushes and compactions of a table
///
/// Jobs run in the order they were scheduled. A failed job is logged and
/// counted; it never stops the worker.
pub struct BackgroundScheduler {
    sender: flume::Sender<Job>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundScheduler {
    pub fn start(table: &str, stats: Arc<Statistics>) -> Result<Self> {
        let (sender, receiver) = flume::unbounded();
        let handle = thread::Builder::new()
            .name(format!("colstore-bg-{table}"))
            .spawn(move || run(receiver, stats))
            .map_err(|e| Status::io_error(format!("Failed to spawn background worker: {e}")))?;

        Ok(BackgroundScheduler {
            sender,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a flush of `store` unless one is already queued
    pub fn schedule_flush(&self, store: &Arc<ColumnFamilyStore>) {
        if store.try_schedule_flush() && self.sender.send(Job::Flush(Arc::clone(store))).is_err() {
            store.clear_flush_scheduled();
        }
    }

    pub fn schedule_compaction(&self, store: &Arc<ColumnFamilyStore>) {
        let _ = self.sender.send(Job::Compact(Arc::clone(store)));
    }

    /// Block until every job scheduled so far has finished
    pub fn wait_idle(&self) {
        let (done, wait) = flume::bounded(1);
        if self.sender.send(Job::Barrier(done)).is_ok() {
            // A closed channel means the worker is gone; nothing left to wait for
            let _ = wait.recv();
        }
    }

    /// Finish queued jobs and stop the worker
    pub fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let _ = self.sender.send(Job::Shutdown);
        if handle.join().is_err() {
            error!("Background worker panicked");
        }
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(receiver: flume::Receiver<Job>, stats: Arc<Statistics>) {
    while let Ok(job) = receiver.recv() {
        match job {
            Job::Flush(store) => {
                store.clear_flush_scheduled();
                match store.flush() {
                    Ok(()) => compact_while_needed(&store, &stats),
                    Err(e) => {
                        error!("Background flush of {} failed: {e}", store.name());
                        stats.record_error();
                    },
                }
            },
            Job::Compact(store) => compact_while_needed(&store, &stats),
            Job::Barrier(done) => {
                let _ = done.send(());
            },
            Job::Shutdown => break,
        }
    }
    debug!("Background worker exiting");
}

fn compact_while_needed(store: &ColumnFamilyStore, stats: &Statistics) {
    while store.needs_compaction() {
        match store.compact(false) {
            Ok(Some(_)) => {},
            Ok(None) => break,
            Err(e) => {
                error!("Background compaction of {} failed: {e}", store.name());
                stats.record_error();
                break;
            },
        }
    }
}
