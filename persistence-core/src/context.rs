// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! The single opaque library context: init/deinit, and the key/value, file, and notification
//! entry points layered over it.
//!
//! Global mutable state (RCT, handle table, notification registry, lifecycle state) lives in one
//! process-wide [`Context`], installed into a [`OnceLock`] by `init()`. This mirrors the original
//! design's process-wide tables while keeping construction explicit and test-isolable: each test
//! that needs a context builds its own [`Context`] directly rather than going through the global.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use crate::blacklist::Blacklist;
use crate::config::RuntimeConfig;
use crate::error::{PersistenceError, Result};
use crate::file::{self, FileAccess, SeekWhence};
use crate::handles::{HandleEntry, HandleKind, HandleTable};
use crate::kv::{self, FileKvBackend, KvBackend};
use crate::lifecycle::Lifecycle;
use crate::notify::{Callback, NotificationBus};
use crate::rct::ResourceConfigTable;
use crate::resolver::Resolver;
use crate::types::{AccessLock, ChangeReason, LifecycleOp, Permission, ResourceKey, ResourceKind, ShutdownMode};

/// Per-open state for a key/value handle: the key API has no notion of a seek offset, so this is
/// simpler than [`file::FileAccess`]'s bookkeeping.
struct KeyHandleState {
    path: PathBuf,
    permission: Permission,
    max_size: u32,
}

/// Per-open state for a file handle: the resolved path the handle was opened against, so
/// `file_write`/`file_close` act on the resource that was actually opened rather than on whatever
/// tuple a caller happens to pass back in.
struct FileHandleState {
    path: PathBuf,
}

/// The process-wide library context.
pub struct Context {
    config: RuntimeConfig,
    app_name: String,
    base_dir: PathBuf,
    rct: ResourceConfigTable,
    blacklist: Blacklist,
    handles: HandleTable,
    notify: NotificationBus,
    kv_backend: FileKvBackend,
    file_cache: crate::file::DirectFileCache,
    lifecycle: Lifecycle,
    key_handles: Mutex<HashMap<i32, KeyHandleState>>,
    file_handles: Mutex<HashMap<i32, FileHandleState>>,
    #[cfg(unix)]
    dispatcher: Mutex<Option<persistence_ipc::Dispatcher>>,
}

static CONTEXT: OnceLock<Context> = OnceLock::new();
static FILE_ACCESS: OnceLock<FileAccess<'static>> = OnceLock::new();

const SHUTDOWN_MAX_CANCEL: u32 = 3;

/// Initializes the global context: loads the RCT and blacklist, starts the supervisor dispatch
/// loop when `shutdown_mode` requests lifecycle notifications, and transitions to `Initialized`.
pub fn init(app_name: &str, base_dir: PathBuf, shutdown_mode: ShutdownMode) -> Result<i32> {
    crate::logging::install(&std::env::var("PERSISTENCE_LOG_LEVEL").unwrap_or_else(|_| "info".into()), &crate::config::LogMethod::default());

    if CONTEXT.get().is_some() {
        return with_context(|ctx| {
            ctx.lifecycle.begin_init()?;
            ctx.lifecycle.complete_init(shutdown_mode);
            Ok(1)
        });
    }

    let config = RuntimeConfig::from_env();
    let rct = ResourceConfigTable::load(&base_dir.join("rct-app.cfg"), &base_dir.join("rct-shared.cfg"))
        .map_err(PersistenceError::Common)?;
    let blacklist = Blacklist::load(&base_dir.join("blacklist.cfg")).map_err(PersistenceError::Common)?;
    let lifecycle = Lifecycle::new(SHUTDOWN_MAX_CANCEL);
    lifecycle.begin_init()?;

    let context = Context {
        config,
        app_name: app_name.to_string(),
        base_dir,
        rct,
        blacklist,
        handles: HandleTable::new(0),
        notify: NotificationBus::default(),
        kv_backend: FileKvBackend,
        file_cache: crate::file::DirectFileCache,
        lifecycle,
        key_handles: Mutex::new(HashMap::new()),
        file_handles: Mutex::new(HashMap::new()),
        #[cfg(unix)]
        dispatcher: Mutex::new(None),
    };
    let handle_table_capacity = context.config.handle_table_capacity;
    let context = Context {
        handles: HandleTable::new(handle_table_capacity),
        ..context
    };

    if CONTEXT.set(context).is_err() {
        return Err(PersistenceError::Common(anyhow::anyhow!("context already initialized")));
    }
    // CONTEXT was just set above and is never cleared afterwards, so this lookup cannot miss.
    let Some(context) = CONTEXT.get() else {
        return Err(PersistenceError::Common(anyhow::anyhow!("context vanished immediately after being set")));
    };
    let _ = FILE_ACCESS.set(FileAccess::new(&context.handles, &context.file_cache, &context.blacklist));

    #[cfg(unix)]
    if !matches!(shutdown_mode, ShutdownMode::None) {
        match persistence_ipc::Dispatcher::connect(context.config.supervisor_socket.clone(), app_name.to_string(), std::sync::Arc::new(ContextSink)) {
            Ok(dispatcher) => {
                *context.dispatcher.lock().unwrap_or_else(|p| p.into_inner()) = Some(dispatcher);
            }
            Err(e) => {
                tracing::warn!("failed to connect to supervisor: {e}");
                return Err(PersistenceError::RegisterLifecycle);
            }
        }
    }

    context.lifecycle.complete_init(shutdown_mode);
    Ok(1)
}

/// Tears down the global context: flushes nothing further (writes are already durable), stops the
/// dispatch loop, and transitions to `Uninitialized`.
pub fn deinit() -> Result<i32> {
    with_context(|ctx| {
        #[cfg(unix)]
        if let Some(dispatcher) = ctx.dispatcher.lock().unwrap_or_else(|p| p.into_inner()).take() {
            dispatcher.shutdown();
        }
        ctx.lifecycle.deinit();
        Ok(1)
    })
}

pub fn lifecycle_set(op: LifecycleOp) -> Result<i32> {
    with_context(|ctx| ctx.lifecycle.lifecycle_set(op))
}

fn with_context<T>(f: impl FnOnce(&Context) -> Result<T>) -> Result<T> {
    match CONTEXT.get() {
        Some(ctx) => f(ctx),
        None => Err(PersistenceError::NotInitialized),
    }
}

impl Context {
    fn resolve(&self, key: &ResourceKey, expected_kind: ResourceKind) -> Result<crate::resolver::Resolved> {
        let resolver = Resolver::new(&self.rct, self.base_dir.clone(), self.app_name.clone());
        let resolved = resolver.resolve(key, expected_kind)?;
        if resolved.descriptor.storage == crate::types::Storage::Custom {
            return Err(PersistenceError::BadPolicy);
        }
        Ok(resolved)
    }

    fn notify_change(&self, key: &ResourceKey, reason: ChangeReason) {
        if let Some((callback, context)) = self.notify.callback_for(key) {
            let c_resource_id = match std::ffi::CString::new(key.resource_id.as_str()) {
                Ok(s) => s,
                Err(_) => return,
            };
            // SAFETY: `callback` was registered by the FFI caller along with `context`; the
            // contract is that it does not outlive the caller's own process lifetime.
            unsafe { callback(key.ldbid, c_resource_id.as_ptr(), key.user_no, key.seat_no, reason, context) };
        }
    }
}

#[cfg(unix)]
struct ContextSink;

#[cfg(unix)]
impl persistence_ipc::SupervisorSink for ContextSink {
    fn on_lifecycle_request(&self, request: persistence_ipc::LifecycleRequestKind, request_id: persistence_ipc::RequestId) {
        use persistence_ipc::LifecycleRequestKind;
        let status = match request {
            LifecycleRequestKind::PrepareShutdown => with_context(|ctx| ctx.lifecycle.on_prepare_shutdown()),
            LifecycleRequestKind::BlockAndWriteback => with_context(|ctx| {
                ctx.lifecycle.on_prepare_shutdown()?;
                ctx.lifecycle.on_writeback_done()
            }),
        };
        let code = status.map(|()| 0).unwrap_or_else(|e| e.as_ffi_code());
        let _ = with_context(|ctx| {
            if let Some(dispatcher) = ctx.dispatcher.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
                dispatcher.send_command(persistence_ipc::DispatchCommand::WritebackComplete { request_id, status: code });
            }
            Ok(())
        });
    }

    fn on_block_and_write_back(&self) {
        let _ = with_context(|ctx| {
            ctx.lifecycle.set_access_lock(AccessLock::Full);
            Ok(())
        });
    }

    fn on_unblock(&self) {
        let _ = with_context(|ctx| {
            ctx.lifecycle.set_access_lock(AccessLock::None);
            Ok(())
        });
    }
}

/// Writes `value` to the key/value resource identified by `key`.
pub fn key_write(key: ResourceKey, value: &[u8]) -> Result<i32> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        let resolved = ctx.resolve(&key, ResourceKind::Key)?;
        let max_size = if resolved.descriptor.max_size == 0 {
            crate::types::DEFAULT_MAX_KEY_VALUE_SIZE
        } else {
            resolved.descriptor.max_size
        };
        let blacklisted = kv::is_blacklisted(&ctx.blacklist, &resolved.path);
        let n = kv::write(&ctx.kv_backend, &resolved.path, resolved.descriptor.permission, max_size, value, blacklisted)?;
        ctx.notify_change(&key, ChangeReason::Changed);
        Ok(n)
    })
}

pub fn key_read(key: ResourceKey, buf: &mut [u8]) -> Result<usize> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        let resolved = ctx.resolve(&key, ResourceKind::Key)?;
        kv::read(&ctx.kv_backend, &resolved.path, resolved.descriptor.permission, buf)
    })
}

pub fn key_get_size(key: ResourceKey) -> Result<usize> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        let resolved = ctx.resolve(&key, ResourceKind::Key)?;
        kv::size(&ctx.kv_backend, &resolved.path)
    })
}

pub fn key_delete(key: ResourceKey) -> Result<()> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        let resolved = ctx.resolve(&key, ResourceKind::Key)?;
        kv::delete(&ctx.kv_backend, &resolved.path)?;
        ctx.notify_change(&key, ChangeReason::Deleted);
        Ok(())
    })
}

pub fn key_handle_open(key: ResourceKey) -> Result<i32> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        let resolved = ctx.resolve(&key, ResourceKind::Key)?;
        let max_size = if resolved.descriptor.max_size == 0 {
            crate::types::DEFAULT_MAX_KEY_VALUE_SIZE
        } else {
            resolved.descriptor.max_size
        };
        let handle = ctx.handles.acquire(HandleEntry {
            kind: HandleKind::Key,
            resource_key: key,
            read_only: !resolved.descriptor.permission.allows_write(),
        })?;
        ctx.key_handles.lock().unwrap_or_else(|p| p.into_inner()).insert(
            handle,
            KeyHandleState {
                path: resolved.path,
                permission: resolved.descriptor.permission,
                max_size,
            },
        );
        Ok(handle)
    })
}

pub fn key_handle_close(handle: i32) -> Result<()> {
    with_context(|ctx| {
        ctx.handles.release(handle)?;
        ctx.key_handles.lock().unwrap_or_else(|p| p.into_inner()).remove(&handle);
        Ok(())
    })
}

pub fn key_handle_read(handle: i32, buf: &mut [u8]) -> Result<usize> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        ctx.handles.get(handle)?;
        let states = ctx.key_handles.lock().unwrap_or_else(|p| p.into_inner());
        let state = states.get(&handle).ok_or(PersistenceError::InvalidHandle(handle))?;
        kv::read(&ctx.kv_backend, &state.path, state.permission, buf)
    })
}

pub fn key_handle_write(handle: i32, value: &[u8]) -> Result<i32> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        let entry = ctx.handles.get(handle)?;
        let states = ctx.key_handles.lock().unwrap_or_else(|p| p.into_inner());
        let state = states.get(&handle).ok_or(PersistenceError::InvalidHandle(handle))?;
        let blacklisted = kv::is_blacklisted(&ctx.blacklist, &state.path);
        let n = kv::write(&ctx.kv_backend, &state.path, state.permission, state.max_size, value, blacklisted)?;
        let resource_key = entry.resource_key.clone();
        drop(states);
        ctx.notify_change(&resource_key, ChangeReason::Changed);
        Ok(n)
    })
}

pub fn key_handle_get_size(handle: i32) -> Result<usize> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        ctx.handles.get(handle)?;
        let states = ctx.key_handles.lock().unwrap_or_else(|p| p.into_inner());
        let state = states.get(&handle).ok_or(PersistenceError::InvalidHandle(handle))?;
        kv::size(&ctx.kv_backend, &state.path)
    })
}

fn file_access() -> Result<&'static FileAccess<'static>> {
    FILE_ACCESS.get().ok_or(PersistenceError::NotInitialized)
}

pub fn file_open(key: ResourceKey, create_if_missing: bool) -> Result<i32> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        let resolved = ctx.resolve(&key, ResourceKind::File)?;
        if !resolved.descriptor.permission.allows_read() && !resolved.descriptor.permission.allows_write() {
            return Err(PersistenceError::BadPolicy);
        }
        let handle = file_access()?.open(key, &resolved.path, resolved.descriptor.permission, create_if_missing)?;
        ctx.file_handles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(handle, FileHandleState { path: resolved.path });
        Ok(handle)
    })
}

pub fn file_read(handle: i32, buf: &mut [u8]) -> Result<usize> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        file_access()?.read(handle, buf)
    })
}

pub fn file_write(handle: i32, buf: &[u8]) -> Result<usize> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        let entry = ctx.handles.get(handle)?;
        let states = ctx.file_handles.lock().unwrap_or_else(|p| p.into_inner());
        let state = states.get(&handle).ok_or(PersistenceError::InvalidHandle(handle))?;
        let n = file_access()?.write(handle, &state.path, buf)?;
        let resource_key = entry.resource_key.clone();
        drop(states);
        ctx.notify_change(&resource_key, ChangeReason::Changed);
        Ok(n)
    })
}

pub fn file_seek(handle: i32, offset: i64, whence: SeekWhence) -> Result<u64> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        file_access()?.seek(handle, offset, whence)
    })
}

pub fn file_close(handle: i32) -> Result<()> {
    with_context(|ctx| {
        let state = ctx.file_handles.lock().unwrap_or_else(|p| p.into_inner()).remove(&handle);
        let path = state.ok_or(PersistenceError::InvalidHandle(handle))?.path;
        file_access()?.close(handle, &path)
    })
}

pub fn file_remove(key: ResourceKey) -> Result<()> {
    with_context(|ctx| {
        ctx.lifecycle.require_accessible()?;
        let resolved = ctx.resolve(&key, ResourceKind::File)?;
        let result = file_access()?.remove(&resolved.path);
        if result.is_ok() {
            ctx.notify_change(&key, ChangeReason::Deleted);
        }
        result
    })
}

pub fn file_create_path(path: &std::path::Path) -> Result<()> {
    file::create_path(path)
}

/// Registers `callback` for change notifications on `key`. `ctx.resolve` already rejects
/// non-key resources (kind mismatch is `BadPolicy`); `storage = Local` resources are private to
/// this process and never notify, so registering against one is rejected here as well.
pub fn key_register_notify_on_change(key: ResourceKey, callback: Callback, user_context: *mut std::os::raw::c_void) -> Result<()> {
    with_context(|ctx| {
        let resolved = ctx.resolve(&key, ResourceKind::Key)?;
        if resolved.descriptor.storage == crate::types::Storage::Local {
            return Err(PersistenceError::NotifyNotAllowed);
        }
        ctx.notify.register(key, callback, user_context)
    })
}

pub fn key_unregister_notify_on_change(key: &ResourceKey) -> Result<()> {
    with_context(|ctx| {
        ctx.notify.unregister(key);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    // The global `OnceLock` makes `init`/`deinit` impossible to exercise in isolation within a
    // single test binary without cross-test interference; the state machine, handle table, kv
    // backend, and resolver each have their own focused unit tests instead. This module covers
    // only logic unique to wiring them together.
    use super::*;

    #[test]
    fn resolve_rejects_custom_storage() {
        let mut rct = ResourceConfigTable::default();
        rct.insert_for_test(
            1,
            "res",
            crate::types::ResourceDescriptor {
                kind: ResourceKind::Key,
                storage: crate::types::Storage::Custom,
                permission: Permission::ReadWrite,
                max_size: 1024,
                custom_id: 7,
            },
        );
        let lifecycle = Lifecycle::new(3);
        lifecycle.begin_init().unwrap();
        lifecycle.complete_init(ShutdownMode::None);
        let ctx = Context {
            config: RuntimeConfig::default(),
            app_name: "app".into(),
            base_dir: PathBuf::from("/tmp/persistence-test"),
            rct,
            blacklist: Blacklist::default(),
            handles: HandleTable::new(8),
            notify: NotificationBus::default(),
            kv_backend: FileKvBackend,
            file_cache: crate::file::DirectFileCache,
            lifecycle,
            key_handles: Mutex::new(HashMap::new()),
            file_handles: Mutex::new(HashMap::new()),
            #[cfg(unix)]
            dispatcher: Mutex::new(None),
        };
        let key = ResourceKey::new(1, "res", 0, 0);
        assert!(matches!(ctx.resolve(&key, ResourceKind::Key), Err(PersistenceError::BadPolicy)));
    }

    fn test_context(storage: crate::types::Storage, kind: ResourceKind) -> Context {
        let mut rct = ResourceConfigTable::default();
        rct.insert_for_test(
            1,
            "res",
            crate::types::ResourceDescriptor {
                kind,
                storage,
                permission: Permission::ReadWrite,
                max_size: 1024,
                custom_id: 0,
            },
        );
        let lifecycle = Lifecycle::new(3);
        lifecycle.begin_init().unwrap();
        lifecycle.complete_init(ShutdownMode::None);
        Context {
            config: RuntimeConfig::default(),
            app_name: "app".into(),
            base_dir: PathBuf::from("/tmp/persistence-test"),
            rct,
            blacklist: Blacklist::default(),
            handles: HandleTable::new(8),
            notify: NotificationBus::default(),
            kv_backend: FileKvBackend,
            file_cache: crate::file::DirectFileCache,
            lifecycle,
            key_handles: Mutex::new(HashMap::new()),
            file_handles: Mutex::new(HashMap::new()),
            #[cfg(unix)]
            dispatcher: Mutex::new(None),
        }
    }

    // `key_register_notify_on_change` itself goes through the global `OnceLock` context, so this
    // exercises the same resolve-then-check-storage logic it runs, against a locally built context.
    #[test]
    fn notify_registration_policy_rejects_local_storage() {
        let ctx = test_context(crate::types::Storage::Local, ResourceKind::Key);
        let key = ResourceKey::new(1, "res", 0, 0);
        let resolved = ctx.resolve(&key, ResourceKind::Key).unwrap();
        let verdict = if resolved.descriptor.storage == crate::types::Storage::Local {
            Err(PersistenceError::NotifyNotAllowed)
        } else {
            Ok(())
        };
        assert!(matches!(verdict, Err(PersistenceError::NotifyNotAllowed)));
    }

    #[test]
    fn notify_registration_policy_rejects_non_key_resources() {
        let ctx = test_context(crate::types::Storage::Shared, ResourceKind::File);
        let key = ResourceKey::new(1, "res", 0, 0);
        assert!(matches!(ctx.resolve(&key, ResourceKind::Key), Err(PersistenceError::BadPolicy)));
    }
}
