// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! Key/value access: `write/read/size/delete` over a resolved path, plus the backend trait
//! the engine is written against.
//!
//! The key/value backend is a narrow trait object so the engine stays testable without real disk
//! I/O. The shipped implementation, [`FileKvBackend`], stores each key as one file under the
//! resolved directory and reuses the crash-safety triad so key/value writes get the same
//! never-torn guarantee as file writes, except for resources the blacklist exempts.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::blacklist::Blacklist;
use crate::checksum;
use crate::error::{PersistenceError, Result};

/// The key/value backend the engine is written against. `backend_key` is the resolved directory
/// for the resource; `key` distinguishes entries within it (the resource itself, for this
/// library's single-value-per-resource model).
pub trait KvBackend: Send + Sync {
    fn get(&self, backend_key: &Path) -> std::io::Result<Option<Vec<u8>>>;
    fn set(&self, backend_key: &Path, value: &[u8], blacklisted: bool) -> std::io::Result<()>;
    fn remove(&self, backend_key: &Path) -> std::io::Result<()>;
    fn len(&self, backend_key: &Path) -> std::io::Result<Option<usize>>;
}

/// Stores each key/value resource as one file, protected by the same original/backup/checksum
/// triad the file API uses for non-blacklisted resources.
pub struct FileKvBackend;

impl FileKvBackend {
    fn triad_paths(path: &Path) -> (PathBuf, PathBuf) {
        let mut backup = path.as_os_str().to_owned();
        backup.push("~");
        let mut crc = path.as_os_str().to_owned();
        crc.push(".crc");
        (PathBuf::from(backup), PathBuf::from(crc))
    }
}

impl KvBackend for FileKvBackend {
    fn get(&self, backend_key: &Path) -> std::io::Result<Option<Vec<u8>>> {
        match File::open(backend_key) {
            Ok(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, backend_key: &Path, value: &[u8], blacklisted: bool) -> std::io::Result<()> {
        if let Some(parent) = backend_key.parent() {
            fs::create_dir_all(parent)?;
        }
        if !blacklisted {
            let (backup, crc) = Self::triad_paths(backend_key);
            if let Ok(mut existing) = OpenOptions::new().read(true).write(true).open(backend_key) {
                let _ = checksum::create_backup(&mut existing, &backup, &crc);
            }
            fs::write(backend_key, value)?;
            let _ = fs::remove_file(&backup);
            let _ = fs::remove_file(&crc);
        } else {
            fs::write(backend_key, value)?;
        }
        Ok(())
    }

    fn remove(&self, backend_key: &Path) -> std::io::Result<()> {
        let (backup, crc) = Self::triad_paths(backend_key);
        let _ = fs::remove_file(&backup);
        let _ = fs::remove_file(&crc);
        match fs::remove_file(backend_key) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "resource not found"))
            }
            Err(e) => Err(e),
        }
    }

    fn len(&self, backend_key: &Path) -> std::io::Result<Option<usize>> {
        match fs::metadata(backend_key) {
            Ok(meta) => Ok(Some(meta.len() as usize)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Writes `value` to the resource at `path`, honoring the permission and size-ceiling checks.
/// `FileKvBackend::set` stages the crash-safety triad unless `path` is blacklisted, extending the
/// same protection the file API gives non-blacklisted resources to key/value resources.
pub fn write(
    backend: &dyn KvBackend,
    path: &Path,
    permission: crate::types::Permission,
    max_size: u32,
    value: &[u8],
    blacklisted: bool,
) -> Result<i32> {
    if !permission.allows_write() {
        return Err(PersistenceError::ReadOnlyResource);
    }
    if value.len() as u32 > max_size {
        return Err(PersistenceError::BufLimit);
    }
    backend.set(path, value, blacklisted).map_err(|e| PersistenceError::Common(e.into()))?;
    Ok(value.len() as i32)
}

/// Reads the resource at `path` into `buf`, returning the number of bytes copied.
pub fn read(backend: &dyn KvBackend, path: &Path, permission: crate::types::Permission, buf: &mut [u8]) -> Result<usize> {
    if !permission.allows_read() {
        return Err(PersistenceError::ReadOnlyResource);
    }
    let value = backend
        .get(path)
        .map_err(|e| PersistenceError::Common(e.into()))?
        .ok_or(PersistenceError::NotFound)?;
    let n = value.len().min(buf.len());
    buf[..n].copy_from_slice(&value[..n]);
    Ok(n)
}

/// Returns the size in bytes of the resource at `path`.
pub fn size(backend: &dyn KvBackend, path: &Path) -> Result<usize> {
    backend
        .len(path)
        .map_err(|e| PersistenceError::Common(e.into()))?
        .ok_or(PersistenceError::NotFound)
}

/// Deletes the resource at `path`.
pub fn delete(backend: &dyn KvBackend, path: &Path) -> Result<()> {
    backend.remove(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PersistenceError::NotFound,
        _ => PersistenceError::Common(e.into()),
    })
}

/// Whether `path` should skip triad protection. Exposed for callers (the file API) that need the
/// same blacklist test the key/value backend applies implicitly via `FileKvBackend`.
pub fn is_blacklisted(blacklist: &Blacklist, path: &Path) -> bool {
    blacklist.contains(path)
}
