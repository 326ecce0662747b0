// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! Maps a resolved RCT entry plus an application's identity to a concrete filesystem path (or, for
//! `Custom` storage, an opaque backend identifier).

use std::path::PathBuf;

use crate::error::{PersistenceError, Result};
use crate::rct::ResourceConfigTable;
use crate::types::{ResourceDescriptor, ResourceKey, ResourceKind, Storage};

/// Where the resolver roots `Local`-storage resources: `<base>/<app_name>/...`.
/// Where it roots `Shared`-storage resources: `<base>/shared/...`.
pub struct Resolver<'a> {
    rct: &'a ResourceConfigTable,
    base_dir: PathBuf,
    app_name: String,
}

/// The result of resolving a tuple against the RCT: a concrete path (meaningless for `Custom`
/// storage, where the backend identifier is authoritative) plus the descriptor that governed the
/// resolution.
pub struct Resolved {
    pub path: PathBuf,
    pub descriptor: ResourceDescriptor,
}

impl<'a> Resolver<'a> {
    pub fn new(rct: &'a ResourceConfigTable, base_dir: PathBuf, app_name: impl Into<String>) -> Self {
        Self {
            rct,
            base_dir,
            app_name: app_name.into(),
        }
    }

    /// Resolves `key`, verifying it matches `expected_kind` at the call site.
    pub fn resolve(&self, key: &ResourceKey, expected_kind: ResourceKind) -> Result<Resolved> {
        let descriptor = self
            .rct
            .lookup(key.ldbid, &key.resource_id)
            .ok_or(PersistenceError::NotFound)?
            .clone();

        if descriptor.kind != expected_kind {
            return Err(PersistenceError::BadPolicy);
        }

        let mut path = match descriptor.storage {
            Storage::Local => self.base_dir.join(&self.app_name),
            Storage::Shared => self.base_dir.join("shared").join(key.ldbid.to_string()),
            Storage::Custom => {
                // The physical path is the custom backend's concern; callers resolving a
                // `Custom` resource must dispatch through the plugin registry instead of using
                // `Resolved::path`.
                return Ok(Resolved {
                    path: PathBuf::new(),
                    descriptor,
                });
            }
        };

        if descriptor.storage == Storage::Shared && key.user_no > 0 {
            path = path.join(format!("user{}", key.user_no));
            if key.seat_no > 0 {
                path = path.join(format!("seat{}", key.seat_no));
            }
        }

        path.push(&key.resource_id);

        Ok(Resolved { path, descriptor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Permission, ResourceDescriptor};
    use std::path::Path;

    fn rct_with(storage: Storage, kind: ResourceKind) -> ResourceConfigTable {
        let mut rct = ResourceConfigTable::default();
        rct.insert_for_test(
            1,
            "res",
            ResourceDescriptor {
                kind,
                storage,
                permission: Permission::ReadWrite,
                max_size: 1024,
                custom_id: 0,
            },
        );
        rct
    }

    #[test]
    fn local_storage_ignores_user_and_seat_when_zero() {
        let rct = rct_with(Storage::Local, ResourceKind::Key);
        let resolver = Resolver::new(&rct, PathBuf::from("/data"), "app1");
        let key = ResourceKey::new(1, "res", 0, 0);
        let resolved = resolver.resolve(&key, ResourceKind::Key).unwrap();
        assert_eq!(resolved.path, Path::new("/data/app1/res"));
    }

    #[test]
    fn local_storage_ignores_user_and_seat_even_when_nonzero() {
        let rct = rct_with(Storage::Local, ResourceKind::Key);
        let resolver = Resolver::new(&rct, PathBuf::from("/data"), "app1");
        let key = ResourceKey::new(1, "res", 7, 3);
        let resolved = resolver.resolve(&key, ResourceKind::Key).unwrap();
        assert_eq!(resolved.path, Path::new("/data/app1/res"));
    }

    #[test]
    fn shared_storage_roots_under_shared_and_keeps_ldbid_scope() {
        let rct = rct_with(Storage::Shared, ResourceKind::File);
        let resolver = Resolver::new(&rct, PathBuf::from("/data"), "app1");
        let key = ResourceKey::new(1, "res", 0, 0);
        let resolved = resolver.resolve(&key, ResourceKind::File).unwrap();
        assert_eq!(resolved.path, Path::new("/data/shared/1/res"));
    }

    #[test]
    fn shared_storage_substitutes_user_and_seat_subpaths() {
        let rct = rct_with(Storage::Shared, ResourceKind::Key);
        let resolver = Resolver::new(&rct, PathBuf::from("/data"), "app1");
        let key = ResourceKey::new(1, "res", 7, 3);
        let resolved = resolver.resolve(&key, ResourceKind::Key).unwrap();
        assert_eq!(resolved.path, Path::new("/data/shared/1/user7/seat3/res"));
    }

    #[test]
    fn kind_mismatch_is_bad_policy() {
        let rct = rct_with(Storage::Local, ResourceKind::File);
        let resolver = Resolver::new(&rct, PathBuf::from("/data"), "app1");
        let key = ResourceKey::new(1, "res", 0, 0);
        assert!(matches!(
            resolver.resolve(&key, ResourceKind::Key),
            Err(PersistenceError::BadPolicy)
        ));
    }

    #[test]
    fn unknown_resource_is_not_found() {
        let rct = ResourceConfigTable::default();
        let resolver = Resolver::new(&rct, PathBuf::from("/data"), "app1");
        let key = ResourceKey::new(1, "missing", 0, 0);
        assert!(matches!(
            resolver.resolve(&key, ResourceKind::Key),
            Err(PersistenceError::NotFound)
        ));
    }
}
