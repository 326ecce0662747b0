// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! Parses the backup-exemption blacklist and exposes a CRC32(path)-keyed membership set.
//!
//! The file is ASCII, whitespace-delimited: space, tab, `\n` and `\r` separate path tokens, every
//! other byte in `0x00..=0x7F` is part of a path. The original parser collects tokens into a
//! fixed-size array before hashing them; [`TOKEN_ARRAY_SIZE`] keeps that cap explicit instead of
//! silently truncating.

use std::collections::HashSet;
use std::path::Path;

use crate::checksum::crc32;

/// The original implementation's fixed token array size: tokens beyond this many in one blacklist
/// file are silently ignored rather than rejected.
pub const TOKEN_ARRAY_SIZE: usize = 1024;

#[derive(Debug, Default)]
pub struct Blacklist {
    hashes: HashSet<u32>,
}

impl Blacklist {
    /// Parses `path`. A missing file is not an error — it is treated as an empty blacklist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(Self::parse(&bytes))
    }

    fn parse(bytes: &[u8]) -> Self {
        let mut hashes = HashSet::new();
        let mut token_start: Option<usize> = None;
        let mut token_count = 0usize;

        let mut push_token = |token: &[u8], hashes: &mut HashSet<u32>| {
            if !token.is_empty() {
                hashes.insert(crc32(0, token));
            }
        };

        for (i, &byte) in bytes.iter().enumerate() {
            let is_separator = matches!(byte, b' ' | b'\t' | b'\n' | b'\r');
            match (is_separator, token_start) {
                (false, None) => token_start = Some(i),
                (true, Some(start)) => {
                    if token_count < TOKEN_ARRAY_SIZE {
                        push_token(&bytes[start..i], &mut hashes);
                        token_count += 1;
                    }
                    token_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = token_start {
            if token_count < TOKEN_ARRAY_SIZE {
                push_token(&bytes[start..], &mut hashes);
            }
        }

        Self { hashes }
    }

    /// Tests whether `path` is exempt from crash-safety backup creation.
    pub fn contains(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.hashes.contains(&crc32(0, text.as_bytes()))
    }
}
