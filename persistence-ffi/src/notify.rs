// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! `persist_key_register_notify_on_change` / `persist_key_unregister_notify_on_change`.

use std::os::raw::{c_char, c_void};

use persistence_core::notify::Callback;

use crate::error::guard;
use crate::types::resource_key;

/// Registers `callback` to be invoked when the key/value resource `(ldbid, resource_id, user_no,
/// seat_no)` changes. At most one distinct callback pointer may be registered process-wide;
/// registering a second, different pointer fails with `NotifyNotAllowed`. Rejected with
/// `BadPolicy` for non-key resources and with `NotifyNotAllowed` for `storage = Local` resources.
///
/// # Safety
///
/// `resource_id` must be NUL-terminated UTF-8. `callback` must remain valid for as long as it
/// stays registered, and must not block: it runs on the calling thread for local changes, and on
/// the supervisor dispatch thread for remote ones.
#[no_mangle]
pub unsafe extern "C" fn persist_key_register_notify_on_change(
    ldbid: u32,
    resource_id: *const c_char,
    user_no: u32,
    seat_no: u32,
    callback: Callback,
    user_context: *mut c_void,
) -> i32 {
    guard(
        move || {
            let key = resource_key(ldbid, resource_id, user_no, seat_no)?;
            persistence_core::context::key_register_notify_on_change(key, callback, user_context)
        },
        |()| 1,
    )
}

/// Unregisters any callback previously registered for this resource. Returns `1` regardless of
/// whether a callback was actually registered.
///
/// # Safety
///
/// `resource_id` must be NUL-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn persist_key_unregister_notify_on_change(ldbid: u32, resource_id: *const c_char, user_no: u32, seat_no: u32) -> i32 {
    guard(
        move || {
            let key = resource_key(ldbid, resource_id, user_no, seat_no)?;
            persistence_core::context::key_unregister_notify_on_change(&key)
        },
        |()| 1,
    )
}
