use std::{
    fs::{self, File},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    env::{Env, RandomAccessFile, WritableFile},
    util::{Result, Status},
};

/// [`Env`] backed by a directory on the local file system
#[derive(Debug, Clone)]
pub struct DiskEnv {
    root: PathBuf,
}

impl DiskEnv {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| Status::io_error(format!("Failed to create directory: {e}")))?;
        Ok(DiskEnv { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Env for DiskEnv {
    fn create(&self, name: &str) -> Result<Box<dyn WritableFile>> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Status::io_error(format!("Failed to create directory: {e}")))?;
        }
        let file = File::create(&path)
            .map_err(|e| Status::io_error(format!("Failed to create {name}: {e}")))?;
        Ok(Box::new(DiskWritableFile { file, size: 0 }))
    }

    fn open(&self, name: &str) -> Result<Box<dyn RandomAccessFile>> {
        let mut file = File::open(self.path(name))
            .map_err(|e| Status::io_error(format!("Failed to open {name}: {e}")))?;
        let size = file
            .seek(SeekFrom::End(0))
            .map_err(|e| Status::io_error(format!("Failed to seek to end: {e}")))?;
        Ok(Box::new(DiskRandomAccessFile {
            file: Mutex::new(file),
            size,
        }))
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    fn delete(&self, name: &str) -> Result<()> {
        fs::remove_file(self.path(name))
            .map_err(|e| Status::io_error(format!("Failed to delete {name}: {e}")))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.path(from), self.path(to))
            .map_err(|e| Status::io_error(format!("Failed to rename {from} to {to}: {e}")))
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let entries = match fs::read_dir(self.path(dir)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Status::io_error(format!("Failed to list {dir}: {e}"))),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn delete_dir(&self, dir: &str) -> Result<()> {
        match fs::remove_dir_all(self.path(dir)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Status::io_error(format!("Failed to delete {dir}: {e}"))),
        }
    }
}

struct DiskWritableFile {
    file: File,
    size: u64,
}

impl WritableFile for DiskWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .map_err(|e| Status::io_error(format!("Failed to append: {e}")))?;
        self.size += data.len() as u64;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| Status::io_error(format!("Failed to sync file: {e}")))
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Reads seek a shared handle, so the handle sits behind a mutex
struct DiskRandomAccessFile {
    file: Mutex<File>,
    size: u64,
}

impl RandomAccessFile for DiskRandomAccessFile {
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        if offset + len as u64 > self.size {
            return Err(Status::io_error(format!(
                "Read of {len} bytes at {offset} past end of file ({} bytes)",
                self.size
            )));
        }

        let mut data = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Status::io_error(format!("Failed to seek: {e}")))?;
        file.read_exact(&mut data)
            .map_err(|e| Status::io_error(format!("Failed to read: {e}")))?;
        Ok(Bytes::from(data))
    }

    fn size(&self) -> u64 {
        self.size
    }
}
