// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! The error taxonomy of the persistence engine, and its mapping onto the small set of negative
//! integer codes the C ABI exposes to applications.

/// Errors produced by the persistence engine.
///
/// Internal call sites propagate this with `?`; only the FFI boundary (`persistence-ffi`) ever
/// collapses a value down to [`PersistenceError::as_ffi_code`].
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("library is not initialized")]
    NotInitialized,
    #[error("access to the persistence store is locked")]
    LockedFs,
    #[error("handle {0} is not open")]
    InvalidHandle(i32),
    #[error("handle table is exhausted")]
    MaxHandle,
    #[error("unknown storage variant or resource kind mismatch")]
    BadPolicy,
    #[error("resource is read-only")]
    ReadOnlyResource,
    #[error("payload exceeds the configured size limit")]
    BufLimit,
    #[error("a different callback is already registered")]
    NotifyNotAllowed,
    #[error("shutdown cancel budget is exhausted")]
    ShutdownMaxCancel,
    #[error("shutdown is not permitted in this shutdown_mode")]
    ShutdownNoPermit,
    #[error("failed to register with the lifecycle supervisor")]
    RegisterLifecycle,
    #[error("failed to register on the administrative channel")]
    RegisterAdmin,
    #[error("failed to start the supervisor dispatch loop")]
    DbusMainloop,
    #[error("file resource is corrupt and has been removed")]
    FileCorrupt,
    #[error("resource not found")]
    NotFound,
    #[error("path exceeds the maximum number of segments")]
    InvalidPath,
    #[error("{0:#}")]
    Common(#[from] anyhow::Error),
}

impl PersistenceError {
    /// Maps a [`PersistenceError`] onto the negative integer code of the original C interface.
    pub fn as_ffi_code(&self) -> i32 {
        match self {
            PersistenceError::NotInitialized => -1,
            PersistenceError::LockedFs => -2,
            PersistenceError::InvalidHandle(_) => -3,
            PersistenceError::MaxHandle => -4,
            PersistenceError::BadPolicy => -5,
            PersistenceError::ReadOnlyResource => -6,
            PersistenceError::BufLimit => -7,
            PersistenceError::NotifyNotAllowed => -8,
            PersistenceError::ShutdownMaxCancel => -9,
            PersistenceError::ShutdownNoPermit => -10,
            PersistenceError::RegisterLifecycle => -11,
            PersistenceError::RegisterAdmin => -12,
            PersistenceError::DbusMainloop => -13,
            PersistenceError::FileCorrupt => -14,
            PersistenceError::NotFound => -15,
            PersistenceError::InvalidPath => -16,
            PersistenceError::Common(_) => -127,
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
