// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! `persist_key_*`: the key/value API, direct and handle-based.

use std::os::raw::c_char;

use persistence_core::PersistenceError;

use crate::error::guard;
use crate::types::resource_key;

/// Writes `len` bytes from `value` to the key/value resource `(ldbid, resource_id, user_no,
/// seat_no)`. Returns the number of bytes written, or a negative error code.
///
/// # Safety
///
/// `resource_id` must be NUL-terminated UTF-8. `value` must point to at least `len` readable
/// bytes (or be any non-null pointer if `len` is zero).
#[no_mangle]
pub unsafe extern "C" fn persist_key_write(
    ldbid: u32,
    resource_id: *const c_char,
    user_no: u32,
    seat_no: u32,
    value: *const u8,
    len: usize,
) -> i32 {
    if value.is_null() && len > 0 {
        return PersistenceError::BadPolicy.as_ffi_code();
    }
    let slice = if len == 0 { &[][..] } else { std::slice::from_raw_parts(value, len) };
    guard(
        move || {
            let key = resource_key(ldbid, resource_id, user_no, seat_no)?;
            persistence_core::context::key_write(key, slice)
        },
        |n| n,
    )
}

/// Reads up to `len` bytes of the key/value resource into `buf`. Returns the number of bytes
/// read, or a negative error code.
///
/// # Safety
///
/// `resource_id` must be NUL-terminated UTF-8. `buf` must point to at least `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn persist_key_read(
    ldbid: u32,
    resource_id: *const c_char,
    user_no: u32,
    seat_no: u32,
    buf: *mut u8,
    len: usize,
) -> i32 {
    if buf.is_null() {
        return PersistenceError::BadPolicy.as_ffi_code();
    }
    let slice = std::slice::from_raw_parts_mut(buf, len);
    guard(
        move || {
            let key = resource_key(ldbid, resource_id, user_no, seat_no)?;
            persistence_core::context::key_read(key, slice)
        },
        |n| n as i32,
    )
}

/// Returns the size, in bytes, of the key/value resource, or a negative error code.
///
/// # Safety
///
/// `resource_id` must be NUL-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn persist_key_get_size(ldbid: u32, resource_id: *const c_char, user_no: u32, seat_no: u32) -> i32 {
    guard(
        move || {
            let key = resource_key(ldbid, resource_id, user_no, seat_no)?;
            persistence_core::context::key_get_size(key)
        },
        |n| n as i32,
    )
}

/// Deletes the key/value resource. Returns `1` on success.
///
/// # Safety
///
/// `resource_id` must be NUL-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn persist_key_delete(ldbid: u32, resource_id: *const c_char, user_no: u32, seat_no: u32) -> i32 {
    guard(
        move || {
            let key = resource_key(ldbid, resource_id, user_no, seat_no)?;
            persistence_core::context::key_delete(key)
        },
        |()| 1,
    )
}

/// Opens a handle to the key/value resource. Returns a positive handle, or a negative error code.
///
/// # Safety
///
/// `resource_id` must be NUL-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn persist_key_handle_open(ldbid: u32, resource_id: *const c_char, user_no: u32, seat_no: u32) -> i32 {
    guard(
        move || {
            let key = resource_key(ldbid, resource_id, user_no, seat_no)?;
            persistence_core::context::key_handle_open(key)
        },
        |n| n,
    )
}

/// Closes a key/value handle. Returns `1` on success.
#[no_mangle]
pub extern "C" fn persist_key_handle_close(handle: i32) -> i32 {
    guard(move || persistence_core::context::key_handle_close(handle), |()| 1)
}

/// Reads through an open key/value handle. Returns the number of bytes read, or a negative error
/// code.
///
/// # Safety
///
/// `buf` must point to at least `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn persist_key_handle_read(handle: i32, buf: *mut u8, len: usize) -> i32 {
    if buf.is_null() {
        return PersistenceError::BadPolicy.as_ffi_code();
    }
    let slice = std::slice::from_raw_parts_mut(buf, len);
    guard(move || persistence_core::context::key_handle_read(handle, slice), |n| n as i32)
}

/// Writes through an open key/value handle. Returns the number of bytes written, or a negative
/// error code.
///
/// # Safety
///
/// `value` must point to at least `len` readable bytes (or be any non-null pointer if `len` is
/// zero).
#[no_mangle]
pub unsafe extern "C" fn persist_key_handle_write(handle: i32, value: *const u8, len: usize) -> i32 {
    if value.is_null() && len > 0 {
        return PersistenceError::BadPolicy.as_ffi_code();
    }
    let slice = if len == 0 { &[][..] } else { std::slice::from_raw_parts(value, len) };
    guard(move || persistence_core::context::key_handle_write(handle, slice), |n| n)
}

/// Returns the size, in bytes, of the resource behind an open key/value handle.
#[no_mangle]
pub extern "C" fn persist_key_handle_get_size(handle: i32) -> i32 {
    guard(move || persistence_core::context::key_handle_get_size(handle), |n| n as i32)
}
