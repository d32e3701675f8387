use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::{
    env::{Env, RandomAccessFile, WritableFile},
    util::{Result, Status},
};

type FileData = Arc<RwLock<Vec<u8>>>;

/// [`Env`] keeping every file in memory.
///
/// Cloning shares the same files. [`MemEnv::set_fail_writes`] makes every
/// subsequent create/append/sync/rename fail with an I/O error until it is
/// turned off again.
#[derive(Clone, Default)]
pub struct MemEnv {
    files: Arc<RwLock<BTreeMap<String, FileData>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemEnv {
    pub fn new() -> Self {
        MemEnv::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Flip every bit of the byte at `offset` in `name`
    pub fn corrupt_byte(&self, name: &str, offset: usize) -> Result<()> {
        let files = self.files.read();
        let data = files
            .get(name)
            .ok_or_else(|| Status::io_error(format!("No such file: {name}")))?;
        let mut data = data.write();
        let byte = data
            .get_mut(offset)
            .ok_or_else(|| Status::io_error(format!("Offset {offset} past end of {name}")))?;
        *byte = !*byte;
        Ok(())
    }

    /// Names of every file, for assertions about what is left on "disk"
    pub fn file_names(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Status::io_error("injected write failure"));
        }
        Ok(())
    }
}

impl Env for MemEnv {
    fn create(&self, name: &str) -> Result<Box<dyn WritableFile>> {
        self.check_writable()?;
        let data: FileData = Arc::new(RwLock::new(Vec::new()));
        self.files.write().insert(name.to_string(), Arc::clone(&data));
        Ok(Box::new(MemWritableFile {
            data,
            fail_writes: Arc::clone(&self.fail_writes),
        }))
    }

    fn open(&self, name: &str) -> Result<Box<dyn RandomAccessFile>> {
        let files = self.files.read();
        let data = files
            .get(name)
            .ok_or_else(|| Status::io_error(format!("No such file: {name}")))?;
        Ok(Box::new(MemRandomAccessFile {
            data: Arc::clone(data),
        }))
    }

    fn exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.files
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Status::io_error(format!("No such file: {name}")))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.check_writable()?;
        let mut files = self.files.write();
        let data = files
            .remove(from)
            .ok_or_else(|| Status::io_error(format!("No such file: {from}")))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{dir}/");
        Ok(self
            .files
            .read()
            .keys()
            .filter_map(|name| name.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn delete_dir(&self, dir: &str) -> Result<()> {
        let prefix = format!("{dir}/");
        self.files.write().retain(|name, _| !name.starts_with(&prefix));
        Ok(())
    }
}

struct MemWritableFile {
    data: FileData,
    fail_writes: Arc<AtomicBool>,
}

impl WritableFile for MemWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Status::io_error("injected write failure"));
        }
        self.data.write().extend_from_slice(data);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Status::io_error("injected sync failure"));
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.read().len() as u64
    }
}

struct MemRandomAccessFile {
    data: FileData,
}

impl RandomAccessFile for MemRandomAccessFile {
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        let data = self.data.read();
        let start = offset as usize;
        let slice = start
            .checked_add(len)
            .and_then(|end| data.get(start..end))
            .ok_or_else(|| {
                Status::io_error(format!(
                    "Read of {len} bytes at {offset} past end of file ({} bytes)",
                    data.len()
                ))
            })?;
        Ok(Bytes::copy_from_slice(slice))
    }

    fn size(&self) -> u64 {
        self.data.read().len() as u64
    }
}
