/// Storage environment the engine runs on.
///
/// Everything durable (segments, write-ahead logs, manifests) goes through
/// an [`Env`]: a flat namespace of `/`-separated file names supporting
/// append-only writes, positional reads, sync, rename and delete. The engine
/// never touches `std::fs` directly.
///
/// # Implementations
///
/// - [`DiskEnv`]: files under a root directory
/// - [`MemEnv`]: process memory, with fault injection for tests
mod disk;
mod mem;

use bytes::Bytes;

pub use disk::DiskEnv;
pub use mem::MemEnv;

use crate::util::Result;

/// A file being written sequentially
pub trait WritableFile: Send {
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Make everything appended so far durable
    fn sync(&mut self) -> Result<()>;

    /// Bytes appended so far
    fn size(&self) -> u64;
}

/// A finished file read at arbitrary offsets, shared by concurrent readers
pub trait RandomAccessFile: Send + Sync {
    /// Read exactly `len` bytes at `offset`
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes>;

    fn size(&self) -> u64;
}

pub trait Env: Send + Sync {
    /// Create (or truncate) a file for appending
    fn create(&self, name: &str) -> Result<Box<dyn WritableFile>>;

    fn open(&self, name: &str) -> Result<Box<dyn RandomAccessFile>>;

    fn exists(&self, name: &str) -> bool;

    fn delete(&self, name: &str) -> Result<()>;

    /// Atomically replace `to` with `from`
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// File names directly under `dir`, without the directory prefix
    fn list(&self, dir: &str) -> Result<Vec<String>>;

    /// Remove `dir` and everything below it; a missing directory is not an error
    fn delete_dir(&self, dir: &str) -> Result<()>;

    fn read_all(&self, name: &str) -> Result<Bytes> {
        let file = self.open(name)?;
        file.read_at(0, file.size() as usize)
    }

    /// Write `data` to `name` atomically: temp file, sync, rename
    fn write_atomic(&self, name: &str, data: &[u8]) -> Result<()> {
        let tmp = format!("{name}.tmp");
        {
            let mut file = self.create(&tmp)?;
            file.append(data)?;
            file.sync()?;
        }
        self.rename(&tmp, name)
    }
}

/// Join path components with `/`
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
