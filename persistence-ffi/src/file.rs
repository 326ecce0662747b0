// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! `persist_file_*`: the handle-based file API.

use std::ffi::CStr;
use std::os::raw::c_char;

use persistence_core::PersistenceError;

use crate::error::{guard, guard64};
use crate::types::{resource_key, seek_whence_from_raw};

/// Opens (creating it first if `create_if_missing` is nonzero and it does not exist) the file
/// resource `(ldbid, resource_id, user_no, seat_no)`. Returns a positive handle, or a negative
/// error code.
///
/// # Safety
///
/// `resource_id` must be NUL-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn persist_file_open(
    ldbid: u32,
    resource_id: *const c_char,
    user_no: u32,
    seat_no: u32,
    create_if_missing: i32,
) -> i32 {
    guard(
        move || {
            let key = resource_key(ldbid, resource_id, user_no, seat_no)?;
            persistence_core::context::file_open(key, create_if_missing != 0)
        },
        |n| n,
    )
}

/// Reads up to `len` bytes from an open file handle, at its current offset. Returns the number of
/// bytes read, or a negative error code.
///
/// # Safety
///
/// `buf` must point to at least `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn persist_file_read(handle: i32, buf: *mut u8, len: usize) -> i32 {
    if buf.is_null() {
        return PersistenceError::BadPolicy.as_ffi_code();
    }
    let slice = std::slice::from_raw_parts_mut(buf, len);
    guard(move || persistence_core::context::file_read(handle, slice), |n| n as i32)
}

/// Writes `len` bytes to an open file handle, at its current offset. Returns the number of bytes
/// written, or a negative error code.
///
/// # Safety
///
/// `buf` must point to at least `len` readable bytes (or be any non-null pointer if `len` is
/// zero).
#[no_mangle]
pub unsafe extern "C" fn persist_file_write(handle: i32, buf: *const u8, len: usize) -> i32 {
    if buf.is_null() && len > 0 {
        return PersistenceError::BadPolicy.as_ffi_code();
    }
    let slice = if len == 0 { &[][..] } else { std::slice::from_raw_parts(buf, len) };
    guard(move || persistence_core::context::file_write(handle, slice), |n| n as i32)
}

/// Repositions an open file handle's offset (`whence`: `0 = start, 1 = current, 2 = end`).
/// Returns the new absolute offset, or a negative error code.
#[no_mangle]
pub extern "C" fn persist_file_seek(handle: i32, offset: i64, whence: i32) -> i64 {
    guard64(
        move || {
            let whence = seek_whence_from_raw(whence)?;
            persistence_core::context::file_seek(handle, offset, whence)
        },
        |n: u64| n as i64,
    )
}

/// Closes an open file handle, reconciling the crash-safety backup. Returns `1` on success.
#[no_mangle]
pub extern "C" fn persist_file_close(handle: i32) -> i32 {
    guard(move || persistence_core::context::file_close(handle), |()| 1)
}

/// Removes the file resource's on-disk triad. Returns `1` on success.
///
/// # Safety
///
/// `resource_id` must be NUL-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn persist_file_remove(ldbid: u32, resource_id: *const c_char, user_no: u32, seat_no: u32) -> i32 {
    guard(
        move || {
            let key = resource_key(ldbid, resource_id, user_no, seat_no)?;
            persistence_core::context::file_remove(key)
        },
        |()| 1,
    )
}

/// Creates the directory chain for `path`. Returns `1` on success.
///
/// # Safety
///
/// `path` must be NUL-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn persist_file_create_path(path: *const c_char) -> i32 {
    if path.is_null() {
        return PersistenceError::BadPolicy.as_ffi_code();
    }
    let parsed = CStr::from_ptr(path).to_str().map(std::path::PathBuf::from);
    guard(
        move || {
            let path = parsed.map_err(|e| PersistenceError::Common(anyhow::anyhow!("path is not valid UTF-8: {e}")))?;
            persistence_core::context::file_create_path(&path)
        },
        |()| 1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_rejects_an_unknown_whence_code() {
        let result = persist_file_seek(1, 0, 9);
        assert!(result < 0);
    }

    #[test]
    fn write_rejects_a_null_buffer_with_a_nonzero_length() {
        let result = unsafe { persist_file_write(1, std::ptr::null(), 4) };
        assert_eq!(result, PersistenceError::BadPolicy.as_ffi_code());
    }

    #[test]
    fn create_path_rejects_a_null_path() {
        let result = unsafe { persist_file_create_path(std::ptr::null()) };
        assert_eq!(result, PersistenceError::BadPolicy.as_ffi_code());
    }
}
