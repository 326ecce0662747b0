// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! `init` / `deinit` / `lifecycle_set`: the lifecycle entry points.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::PathBuf;

use persistence_core::PersistenceError;

use crate::error::guard;
use crate::types::{lifecycle_op_from_raw, shutdown_mode_from_raw};

/// Initializes the library for `app_name`, rooted at `base_dir`, with the given `shutdown_mode`
/// (`0 = none, 1 = normal, 2 = fast`). Returns `1` on success, a negative
/// [`persistence_core::PersistenceError::as_ffi_code`] on failure.
///
/// # Safety
///
/// `app_name` and `base_dir` must be valid, NUL-terminated, UTF-8 C strings.
#[no_mangle]
pub unsafe extern "C" fn persist_init(app_name: *const c_char, base_dir: *const c_char, shutdown_mode: i32) -> i32 {
    if app_name.is_null() || base_dir.is_null() {
        return PersistenceError::BadPolicy.as_ffi_code();
    }
    let app_name = CStr::from_ptr(app_name).to_str().map(str::to_string);
    let base_dir = CStr::from_ptr(base_dir).to_str().map(str::to_string);
    guard(
        move || {
            let app_name = app_name.map_err(|e| PersistenceError::Common(anyhow::anyhow!("app_name is not valid UTF-8: {e}")))?;
            let base_dir = base_dir.map_err(|e| PersistenceError::Common(anyhow::anyhow!("base_dir is not valid UTF-8: {e}")))?;
            let shutdown_mode = shutdown_mode_from_raw(shutdown_mode)?;
            persistence_core::context::init(&app_name, PathBuf::from(base_dir), shutdown_mode)
        },
        |n| n,
    )
}

/// Tears down the library: stops the supervisor dispatch loop and returns to the uninitialized
/// state. Returns `1` on success.
#[no_mangle]
pub extern "C" fn persist_deinit() -> i32 {
    guard(persistence_core::context::deinit, |n| n)
}

/// The user-initiated shutdown/cancel entry point (`request`: `0 = shutdown, 1 = cancel`). Only
/// legal when no external supervisor owns this process's lifecycle.
#[no_mangle]
pub extern "C" fn persist_lifecycle_set(request: i32) -> i32 {
    guard(
        move || {
            let op = lifecycle_op_from_raw(request)?;
            persistence_core::context::lifecycle_set(op)
        },
        |n| n,
    )
}
