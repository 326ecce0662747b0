// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! Conversions between raw C arguments and the core's resource-addressing types.

use std::ffi::CStr;
use std::os::raw::c_char;

use persistence_core::types::{LifecycleOp, ResourceKey, ShutdownMode};
use persistence_core::PersistenceError;

/// Builds a [`ResourceKey`] from the four-tuple every entry point takes as raw arguments.
///
/// # Safety
///
/// `resource_id` must be a valid, NUL-terminated, UTF-8 C string.
pub(crate) unsafe fn resource_key(
    ldbid: u32,
    resource_id: *const c_char,
    user_no: u32,
    seat_no: u32,
) -> Result<ResourceKey, PersistenceError> {
    if resource_id.is_null() {
        return Err(PersistenceError::BadPolicy);
    }
    let resource_id = CStr::from_ptr(resource_id)
        .to_str()
        .map_err(|e| PersistenceError::Common(anyhow::anyhow!("resource_id is not valid UTF-8: {e}")))?;
    Ok(ResourceKey::new(ldbid, resource_id, user_no, seat_no))
}

/// `shutdown_mode` argument of `persist_init`: `0 = none, 1 = normal, 2 = fast`.
pub(crate) fn shutdown_mode_from_raw(mode: i32) -> Result<ShutdownMode, PersistenceError> {
    match mode {
        0 => Ok(ShutdownMode::None),
        1 => Ok(ShutdownMode::Normal),
        2 => Ok(ShutdownMode::Fast),
        _ => Err(PersistenceError::Common(anyhow::anyhow!("unknown shutdown_mode {mode}"))),
    }
}

/// `request` argument of `persist_lifecycle_set`: `0 = shutdown, 1 = cancel`.
pub(crate) fn lifecycle_op_from_raw(request: i32) -> Result<LifecycleOp, PersistenceError> {
    match request {
        0 => Ok(LifecycleOp::Shutdown),
        1 => Ok(LifecycleOp::Cancel),
        _ => Err(PersistenceError::Common(anyhow::anyhow!("unknown lifecycle request {request}"))),
    }
}

/// `whence` argument of `persist_file_seek`: `0 = start, 1 = current, 2 = end`.
pub(crate) fn seek_whence_from_raw(whence: i32) -> Result<persistence_core::file::SeekWhence, PersistenceError> {
    use persistence_core::file::SeekWhence;
    match whence {
        0 => Ok(SeekWhence::Start),
        1 => Ok(SeekWhence::Current),
        2 => Ok(SeekWhence::End),
        _ => Err(PersistenceError::Common(anyhow::anyhow!("unknown seek whence {whence}"))),
    }
}
