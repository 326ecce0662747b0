// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! CRC32 and the original/backup/checksum triad protocol that makes a single file write
//! crash-consistent.
//!
//! A file subject to crash protection has, at any moment, at most three artifacts on disk: the
//! original at `P`, a backup at `P~`, and a checksum file at `P.crc` holding the backup's CRC32
//! as ASCII hex. [`verify_and_recover`] is run on open and collapses those three into a single
//! trustworthy original; [`create_backup`] is run before the first write of an open to stage the
//! rollback point.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::Context;

/// Computes the CRC32 of `bytes`, continuing from `seed` (pass `0` to start a fresh checksum).
pub fn crc32(seed: u32, bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(seed);
    hasher.update(bytes);
    hasher.finalize()
}

fn crc32_of_file(path: &Path) -> anyhow::Result<u32> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(crc32(0, &buf))
}

fn read_checksum_hex(path: &Path) -> anyhow::Result<u32> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    u32::from_str_radix(text.trim(), 16).with_context(|| format!("parsing checksum in {}", path.display()))
}

/// Outcome of [`verify_and_recover`].
pub struct Recovered {
    /// `true` when the backup was copied onto the original to reach a consistent state.
    pub rolled_back: bool,
}

/// Reconciles the `(original, backup, checksum)` triad before an open, following the branch table
/// of the crash-safety contract. On success the original at `original` is left in a state whose
/// bytes match a CRC that was observed durable; `backup` and `checksum` are removed once no longer
/// needed for recovery. Returns `Err` (with the triad fully removed) when no branch yields a
/// trustworthy original.
pub fn verify_and_recover(original: &Path, backup: &Path, checksum: &Path) -> anyhow::Result<Recovered> {
    let has_original = original.exists();
    let has_backup = backup.exists();
    let has_checksum = checksum.exists();

    let outcome = match (has_original, has_backup, has_checksum) {
        (_, true, true) => {
            let backup_crc = crc32_of_file(backup)?;
            let expected = read_checksum_hex(checksum)?;
            if backup_crc == expected {
                recover_from_backup(backup, original)?;
                Ok(Recovered { rolled_back: true })
            } else if has_original && crc32_of_file(original)? == expected {
                Ok(Recovered { rolled_back: false })
            } else {
                Err(())
            }
        }
        (true, false, true) => {
            let expected = read_checksum_hex(checksum)?;
            if crc32_of_file(original)? == expected {
                Ok(Recovered { rolled_back: false })
            } else {
                Err(())
            }
        }
        (true, true, false) => {
            if crc32_of_file(backup)? == crc32_of_file(original)? {
                Ok(Recovered { rolled_back: false })
            } else {
                Err(())
            }
        }
        // No triad artifacts beyond (maybe) the original itself: nothing to reconcile.
        _ => Ok(Recovered { rolled_back: false }),
    };

    match outcome {
        Ok(recovered) => {
            let _ = fs::remove_file(backup);
            let _ = fs::remove_file(checksum);
            Ok(recovered)
        }
        Err(()) => {
            let _ = fs::remove_file(original);
            let _ = fs::remove_file(backup);
            let _ = fs::remove_file(checksum);
            anyhow::bail!("triad for {} is not recoverable", original.display());
        }
    }
}

/// Stages a rollback point for `original` before an in-place write: writes the checksum file
/// first (so a crash during the backup copy never leaves a checksum pointing at a partial
/// backup), then copies `original`'s current bytes to `backup_path`. The original file's seek
/// offset is restored before returning.
pub fn create_backup(original: &mut File, backup_path: &Path, checksum_path: &Path) -> anyhow::Result<()> {
    let saved_offset = original.stream_position().context("saving seek offset")?;
    original
        .seek(SeekFrom::Start(0))
        .context("seeking to start for backup")?;
    let mut content = Vec::new();
    original
        .read_to_end(&mut content)
        .context("reading original content for backup")?;

    let checksum = crc32(0, &content);
    {
        let mut checksum_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(checksum_path)
            .with_context(|| format!("creating {}", checksum_path.display()))?;
        checksum_file
            .write_all(format!("{checksum:08x}").as_bytes())
            .context("writing checksum")?;
    }
    {
        let mut backup_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(backup_path)
            .with_context(|| format!("creating {}", backup_path.display()))?;
        backup_file.write_all(&content).context("writing backup")?;
    }

    original
        .seek(SeekFrom::Start(saved_offset))
        .context("restoring seek offset")?;
    Ok(())
}

/// Truncates `original_path` and copies `backup`'s bytes over it.
pub fn recover_from_backup(backup: &Path, original_path: &Path) -> anyhow::Result<()> {
    let content =
        fs::read(backup).with_context(|| format!("reading backup {}", backup.display()))?;
    fs::write(original_path, content)
        .with_context(|| format!("restoring {}", original_path.display()))?;
    Ok(())
}
