// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! The Resource Configuration Table: a read-only catalog mapping `(ldbid, resource_id)` to a
//! [`ResourceDescriptor`], loaded once at `init()` from a per-application table and a shared
//! table, searched in that order.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;

use crate::types::{Permission, ResourceDescriptor, ResourceKind, Storage};

/// The two-table, app-then-shared resource catalog.
#[derive(Debug, Default)]
pub struct ResourceConfigTable {
    app: BTreeMap<(u32, String), ResourceDescriptor>,
    shared: BTreeMap<(u32, String), ResourceDescriptor>,
}

impl ResourceConfigTable {
    /// Loads the per-application table and, if present, the shared table. A missing file at
    /// either path is not an error — it is treated as an empty table.
    pub fn load(app_table_path: &Path, shared_table_path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            app: load_table(app_table_path)?,
            shared: load_table(shared_table_path)?,
        })
    }

    /// Looks up a descriptor, preferring the per-application table over the shared one.
    pub fn lookup(&self, ldbid: u32, resource_id: &str) -> Option<&ResourceDescriptor> {
        let key = (ldbid, resource_id.to_string());
        self.app.get(&key).or_else(|| self.shared.get(&key))
    }

    #[cfg(test)]
    pub fn insert_for_test(&mut self, ldbid: u32, resource_id: &str, descriptor: ResourceDescriptor) {
        self.app.insert((ldbid, resource_id.to_string()), descriptor);
    }
}

fn load_table(path: &Path) -> anyhow::Result<BTreeMap<(u32, String), ResourceDescriptor>> {
    let mut table = BTreeMap::new();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(table),
        Err(e) => return Err(e).with_context(|| format!("reading RCT table {}", path.display())),
    };

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 7 {
            anyhow::bail!(
                "{}:{}: expected 7 fields, found {}",
                path.display(),
                line_no + 1,
                fields.len()
            );
        }
        let ldbid = parse_u32(fields[0], path, line_no)?;
        let resource_id = fields[1].to_string();
        let kind = parse_kind(fields[2], path, line_no)?;
        let storage = parse_storage(fields[3], path, line_no)?;
        let permission = parse_permission(fields[4], path, line_no)?;
        let max_size = parse_u32(fields[5], path, line_no)?;
        let custom_id: u8 = fields[6]
            .parse()
            .with_context(|| format!("{}:{}: bad custom_id", path.display(), line_no + 1))?;

        table.insert(
            (ldbid, resource_id),
            ResourceDescriptor {
                kind,
                storage,
                permission,
                max_size,
                custom_id,
            },
        );
    }
    Ok(table)
}

fn parse_u32(field: &str, path: &Path, line_no: usize) -> anyhow::Result<u32> {
    if let Some(hex) = field.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        field.parse()
    }
    .with_context(|| format!("{}:{}: bad integer {field:?}", path.display(), line_no + 1))
}

fn parse_kind(field: &str, path: &Path, line_no: usize) -> anyhow::Result<ResourceKind> {
    match field {
        "key" => Ok(ResourceKind::Key),
        "file" => Ok(ResourceKind::File),
        other => anyhow::bail!("{}:{}: unknown kind {other:?}", path.display(), line_no + 1),
    }
}

fn parse_storage(field: &str, path: &Path, line_no: usize) -> anyhow::Result<Storage> {
    match field {
        "local" => Ok(Storage::Local),
        "shared" => Ok(Storage::Shared),
        "custom" => Ok(Storage::Custom),
        other => anyhow::bail!("{}:{}: unknown storage {other:?}", path.display(), line_no + 1),
    }
}

fn parse_permission(field: &str, path: &Path, line_no: usize) -> anyhow::Result<Permission> {
    match field {
        "ro" => Ok(Permission::ReadOnly),
        "wo" => Ok(Permission::WriteOnly),
        "rw" => Ok(Permission::ReadWrite),
        other => anyhow::bail!("{}:{}: unknown permission {other:?}", path.display(), line_no + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_table(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn app_table_shadows_shared_table() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let app = write_table(
            dir.path(),
            "app.rct",
            "0xFF keyValue_Resource_01 key shared rw 1024 0\n",
        );
        let shared = write_table(
            dir.path(),
            "shared.rct",
            "0xFF keyValue_Resource_01 key shared ro 64 0\n0xFF other_resource file shared rw 4096 0\n",
        );

        let rct = ResourceConfigTable::load(&app, &shared)?;
        let descriptor = rct.lookup(0xFF, "keyValue_Resource_01").unwrap();
        assert_eq!(descriptor.permission, Permission::ReadWrite);
        assert_eq!(descriptor.max_size, 1024);

        let other = rct.lookup(0xFF, "other_resource").unwrap();
        assert_eq!(other.kind, ResourceKind::File);
        Ok(())
    }

    #[test]
    fn missing_tables_are_empty_not_errors() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let rct = ResourceConfigTable::load(&dir.path().join("nope.rct"), &dir.path().join("also-nope.rct"))?;
        assert!(rct.lookup(0, "anything").is_none());
        Ok(())
    }

    #[test]
    fn unknown_lookup_returns_none() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let app = write_table(dir.path(), "app.rct", "1 r key local rw 10 0\n");
        let rct = ResourceConfigTable::load(&app, &dir.path().join("shared.rct"))?;
        assert!(rct.lookup(2, "r").is_none());
        Ok(())
    }
}
