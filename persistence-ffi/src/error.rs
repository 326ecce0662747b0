// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! The last-error-message side channel, and the panic-catching call wrapper every exported
//! function goes through.
//!
//! The integer code returned by each function is the primary contract; the message stashed here
//! is diagnostic-only and valid until the next call on the same thread.

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use persistence_core::PersistenceError;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// A borrowed, non-owning view of a byte string, valid until the next call on the same thread.
#[repr(C)]
pub struct StringSlice {
    pub ptr: *const c_char,
    pub len: usize,
}

impl StringSlice {
    fn empty() -> Self {
        StringSlice { ptr: std::ptr::null(), len: 0 }
    }
}

fn set_last_error(message: String) {
    let Ok(c_message) = CString::new(message) else {
        return;
    };
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(c_message));
}

/// Returns the last error message observed on the calling thread, or an empty slice if none has
/// been recorded (or it has already been cleared).
///
/// # Safety
///
/// The returned pointer is valid only until the next call into this library on the same thread.
#[no_mangle]
pub unsafe extern "C" fn persist_last_error_message() -> StringSlice {
    LAST_ERROR.with(|slot| match slot.borrow().as_ref() {
        Some(message) => StringSlice {
            ptr: message.as_ptr(),
            len: message.as_bytes().len(),
        },
        None => StringSlice::empty(),
    })
}

/// Clears the calling thread's last error message.
#[no_mangle]
pub extern "C" fn persist_clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Runs `body`, catching panics and recording the resulting error message, and collapses the
/// outcome to the original interface's convention: a non-negative value on success, or one of
/// [`PersistenceError::as_ffi_code`]'s negative codes on failure.
pub(crate) fn guard<T>(body: impl FnOnce() -> Result<T, PersistenceError>, ok: impl FnOnce(T) -> i32) -> i32 {
    guard_as(body, ok)
}

/// Like [`guard`], but for the one entry point (`persist_file_seek`) whose success value is wider
/// than `i32`: a file offset can legitimately exceed it.
pub(crate) fn guard64<T>(body: impl FnOnce() -> Result<T, PersistenceError>, ok: impl FnOnce(T) -> i64) -> i64 {
    guard_as(body, ok)
}

fn guard_as<T, R: From<i32>>(body: impl FnOnce() -> Result<T, PersistenceError>, ok: impl FnOnce(T) -> R) -> R {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => ok(value),
        Ok(Err(e)) => {
            let code = e.as_ffi_code();
            set_last_error(e.to_string());
            R::from(code)
        }
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else {
                "panic with no message".to_string()
            };
            set_last_error(message);
            R::from(PersistenceError::Common(anyhow::anyhow!("panic crossing the FFI boundary")).as_ffi_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_reports_the_ok_path() {
        let result = guard(|| Ok::<_, PersistenceError>(42), |n| n);
        assert_eq!(result, 42);
    }

    #[test]
    fn guard_maps_errors_to_their_ffi_code_and_records_the_message() {
        persist_clear_last_error();
        let result = guard(|| Err(PersistenceError::NotInitialized), |()| 0);
        assert_eq!(result, PersistenceError::NotInitialized.as_ffi_code());
        let message = unsafe { persist_last_error_message() };
        assert!(message.len > 0);
    }

    #[test]
    fn guard_catches_panics_and_still_returns_a_negative_code() {
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        let result = guard(|| -> Result<(), PersistenceError> { panic!("boundary test panic") }, |()| 0);
        std::panic::set_hook(original_hook);
        assert!(result < 0);
        let message = unsafe { persist_last_error_message() };
        assert!(message.len > 0);
    }
}
