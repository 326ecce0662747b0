// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! File access: `open/read/write/seek/close/remove/create_path`, with the crash-safety
//! triad staged on first write and reconciled on open.
//!
//! The file cache is modeled as [`FileCacheBackend`] so file access never depends on `std::fs`
//! directly. [`DirectFileCache`] is the shipped, uncached implementation.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::blacklist::Blacklist;
use crate::checksum;
use crate::error::{PersistenceError, Result};
use crate::handles::{HandleEntry, HandleKind, HandleTable};
use crate::types::{Permission, ResourceKey};

/// Maximum number of path segments `create_path` / `open`'s directory creation will walk before
/// giving up with `InvalidPath`.
pub const MAX_PATH_SEGMENTS: usize = 23;

const FILE_MODE: u32 = 0o664;
const DIR_MODE: u32 = 0o744;

/// An open file-like object, as returned by a [`FileCacheBackend`].
pub trait FileHandle: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> FileHandle for T {}

/// The file cache backend the engine is written against.
pub trait FileCacheBackend: Send + Sync {
    fn open(&self, path: &Path, create: bool) -> io::Result<Box<dyn FileHandle>>;
}

/// A pass-through implementation with no caching: every call goes straight to `std::fs`.
pub struct DirectFileCache;

impl FileCacheBackend for DirectFileCache {
    fn open(&self, path: &Path, create: bool) -> io::Result<Box<dyn FileHandle>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .mode(FILE_MODE)
            .open(path)?;
        Ok(Box::new(file))
    }
}

/// Counts named path segments the way the original `pclCreateFile` does: tokenizing on `/` and
/// counting only the tokens, never the leading root slash.
fn count_segments(path: &Path) -> usize {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::RootDir | std::path::Component::Prefix(_)))
        .count()
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    if count_segments(path) > MAX_PATH_SEGMENTS {
        return Err(PersistenceError::InvalidPath);
    }
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(DIR_MODE);
    builder
        .create(parent)
        .map_err(|e| PersistenceError::Common(e.into()))
}

fn triad_paths(path: &Path) -> (PathBuf, PathBuf) {
    let mut backup = path.as_os_str().to_owned();
    backup.push("~");
    let mut crc = path.as_os_str().to_owned();
    crc.push(".crc");
    (PathBuf::from(backup), PathBuf::from(crc))
}

/// Tracks open file objects and per-open "has this handle written yet" state alongside the
/// generic [`HandleTable`] that owns id allocation.
pub struct FileAccess<'a> {
    handles: &'a HandleTable,
    cache: &'a dyn FileCacheBackend,
    blacklist: &'a Blacklist,
    open_files: Mutex<HashMap<i32, Box<dyn FileHandle>>>,
    backed_up: Mutex<HashSet<i32>>,
}

impl<'a> FileAccess<'a> {
    pub fn new(handles: &'a HandleTable, cache: &'a dyn FileCacheBackend, blacklist: &'a Blacklist) -> Self {
        Self {
            handles,
            cache,
            blacklist,
            open_files: Mutex::new(HashMap::new()),
            backed_up: Mutex::new(HashSet::new()),
        }
    }

    /// Opens the file resource at `path`, running crash-recovery first unless the path is
    /// blacklisted, and creating it (with its parent directories) if absent and requested.
    pub fn open(
        &self,
        resource_key: ResourceKey,
        path: &Path,
        permission: Permission,
        create_if_missing: bool,
    ) -> Result<i32> {
        let (backup, crc) = triad_paths(path);
        let skip_triad = self.blacklist.contains(path);

        if !skip_triad && permission.allows_write() && path.exists() {
            checksum::verify_and_recover(path, &backup, &crc)
                .map_err(|_| PersistenceError::FileCorrupt)?;
        }

        if !path.exists() {
            if !create_if_missing {
                return Err(PersistenceError::NotFound);
            }
            create_parent_dirs(path)?;
        }

        let file = self
            .cache
            .open(path, create_if_missing)
            .map_err(|e| PersistenceError::Common(e.into()))?;

        let handle = self.handles.acquire(HandleEntry {
            kind: HandleKind::File,
            resource_key,
            read_only: !permission.allows_write(),
        })?;
        self.open_files.lock().unwrap_or_else(|p| p.into_inner()).insert(handle, file);
        Ok(handle)
    }

    pub fn read(&self, handle: i32, buf: &mut [u8]) -> Result<usize> {
        self.handles.get(handle)?;
        let mut files = self.open_files.lock().unwrap_or_else(|p| p.into_inner());
        let file = files.get_mut(&handle).ok_or(PersistenceError::InvalidHandle(handle))?;
        file.read(buf).map_err(|e| PersistenceError::Common(e.into()))
    }

    /// Writes `buf` at the handle's current position. On the first write of a given open, stages
    /// the crash-safety backup (unless the resolved path is blacklisted) before performing the
    /// in-place write.
    pub fn write(&self, handle: i32, path: &Path, buf: &[u8]) -> Result<usize> {
        let entry = self.handles.get(handle)?;
        if entry.read_only {
            return Err(PersistenceError::ReadOnlyResource);
        }

        let mut backed_up = self.backed_up.lock().unwrap_or_else(|p| p.into_inner());
        let first_write = backed_up.insert(handle);
        drop(backed_up);

        if first_write && !self.blacklist.contains(path) {
            if let Ok(mut snapshot) = OpenOptions::new().read(true).write(true).open(path) {
                let (backup, crc) = triad_paths(path);
                let _ = checksum::create_backup(&mut snapshot, &backup, &crc);
            }
        }

        let mut files = self.open_files.lock().unwrap_or_else(|p| p.into_inner());
        let file = files.get_mut(&handle).ok_or(PersistenceError::InvalidHandle(handle))?;
        file.write(buf).map_err(|e| PersistenceError::Common(e.into()))
    }

    pub fn seek(&self, handle: i32, offset: i64, whence: SeekWhence) -> Result<u64> {
        self.handles.get(handle)?;
        let mut files = self.open_files.lock().unwrap_or_else(|p| p.into_inner());
        let file = files.get_mut(&handle).ok_or(PersistenceError::InvalidHandle(handle))?;
        let pos = match whence {
            SeekWhence::Start => SeekFrom::Start(offset as u64),
            SeekWhence::Current => SeekFrom::Current(offset),
            SeekWhence::End => SeekFrom::End(offset),
        };
        file.seek(pos).map_err(|e| PersistenceError::Common(e.into()))
    }

    /// Closes `handle`. On a clean close of a resource that was written to, reconciles the triad
    /// by deleting the now-unneeded backup and checksum: a clean close means the write is durable,
    /// so the backup's only purpose — recovering from an unclean shutdown — no longer applies.
    pub fn close(&self, handle: i32, path: &Path) -> Result<()> {
        self.handles.release(handle)?;
        self.open_files.lock().unwrap_or_else(|p| p.into_inner()).remove(&handle);
        let mut backed_up = self.backed_up.lock().unwrap_or_else(|p| p.into_inner());
        if backed_up.remove(&handle) {
            let (backup, crc) = triad_paths(path);
            let _ = fs::remove_file(backup);
            let _ = fs::remove_file(crc);
        }
        Ok(())
    }

    pub fn remove(&self, path: &Path) -> Result<()> {
        let (backup, crc) = triad_paths(path);
        let _ = fs::remove_file(&backup);
        let _ = fs::remove_file(&crc);
        fs::remove_file(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PersistenceError::NotFound,
            _ => PersistenceError::Common(e.into()),
        })
    }
}

/// Creates the directory chain for `path`, up to [`MAX_PATH_SEGMENTS`] segments.
pub fn create_path(path: &Path) -> Result<()> {
    if count_segments(path) > MAX_PATH_SEGMENTS {
        return Err(PersistenceError::InvalidPath);
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(DIR_MODE);
    builder.create(path).map_err(|e| PersistenceError::Common(e.into()))
}

/// `whence` argument to [`FileAccess::seek`]. `repr(C)` since it crosses the FFI boundary as a
/// plain argument, with the same discriminants as the standard `SEEK_SET`/`SEEK_CUR`/`SEEK_END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum SeekWhence {
    Start = 0,
    Current = 1,
    End = 2,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key() -> ResourceKey {
        ResourceKey::new(1, "res", 0, 0)
    }

    #[test]
    fn open_with_create_makes_directory_chain_and_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a/b/c/res");
        let handles = HandleTable::new(4);
        let cache = DirectFileCache;
        let blacklist = Blacklist::default();
        let access = FileAccess::new(&handles, &cache, &blacklist);

        let h = access.open(key(), &path, Permission::ReadWrite, true)?;
        assert!(h > 0);
        assert!(path.exists());
        access.close(h, &path)?;

        // A second open against the now-existing file should succeed without recreating it.
        let h2 = access.open(key(), &path, Permission::ReadWrite, true)?;
        assert!(h2 > 0);
        access.close(h2, &path)?;
        Ok(())
    }

    #[test]
    fn open_without_create_on_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");
        let handles = HandleTable::new(4);
        let cache = DirectFileCache;
        let blacklist = Blacklist::default();
        let access = FileAccess::new(&handles, &cache, &blacklist);
        assert!(matches!(
            access.open(key(), &path, Permission::ReadWrite, false),
            Err(PersistenceError::NotFound)
        ));
    }

    #[test]
    fn write_then_read_round_trips_through_a_reopen() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("res");
        let handles = HandleTable::new(4);
        let cache = DirectFileCache;
        let blacklist = Blacklist::default();
        let access = FileAccess::new(&handles, &cache, &blacklist);

        let h = access.open(key(), &path, Permission::ReadWrite, true)?;
        access.write(h, &path, b"hello world")?;
        access.close(h, &path)?;

        let h2 = access.open(key(), &path, Permission::ReadWrite, true)?;
        let mut buf = [0u8; 32];
        let n = access.read(h2, &mut buf)?;
        assert_eq!(&buf[..n], b"hello world");
        access.close(h2, &path)?;
        Ok(())
    }

    #[test]
    fn closing_after_write_deletes_the_triad() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("res");
        fs::write(&path, b"original")?;
        let handles = HandleTable::new(4);
        let cache = DirectFileCache;
        let blacklist = Blacklist::default();
        let access = FileAccess::new(&handles, &cache, &blacklist);

        let h = access.open(key(), &path, Permission::ReadWrite, true)?;
        access.write(h, &path, b"updated")?;
        access.close(h, &path)?;

        let (backup, crc) = triad_paths(&path);
        assert!(!backup.exists());
        assert!(!crc.exists());
        Ok(())
    }

    #[test]
    fn create_path_rejects_paths_deeper_than_the_segment_limit() {
        let mut path = PathBuf::from("/");
        for i in 0..(MAX_PATH_SEGMENTS + 2) {
            path.push(format!("seg{i}"));
        }
        assert!(matches!(create_path(&path), Err(PersistenceError::InvalidPath)));
    }

    #[test]
    fn exactly_max_path_segments_is_accepted() {
        let mut path = PathBuf::from("/");
        for i in 0..MAX_PATH_SEGMENTS {
            path.push(format!("seg{i}"));
        }
        assert_eq!(count_segments(&path), MAX_PATH_SEGMENTS);
    }

    #[test]
    fn one_more_than_max_path_segments_is_rejected() {
        let mut path = PathBuf::from("/");
        for i in 0..(MAX_PATH_SEGMENTS + 1) {
            path.push(format!("seg{i}"));
        }
        assert_eq!(count_segments(&path), MAX_PATH_SEGMENTS + 1);
        assert!(matches!(create_path(&path), Err(PersistenceError::InvalidPath)));
    }

    #[test]
    fn use_after_close_is_invalid_handle() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("res");
        let handles = HandleTable::new(4);
        let cache = DirectFileCache;
        let blacklist = Blacklist::default();
        let access = FileAccess::new(&handles, &cache, &blacklist);

        let h = access.open(key(), &path, Permission::ReadWrite, true)?;
        access.close(h, &path)?;
        let mut buf = [0u8; 8];
        assert!(matches!(access.read(h, &mut buf), Err(PersistenceError::InvalidHandle(_))));
        Ok(())
    }
}
