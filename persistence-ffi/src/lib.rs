// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! C ABI for `persistence-core`. Every exported function is `extern "C"`, catches panics at the
//! boundary, and returns a negative integer from [`persistence_core::PersistenceError::as_ffi_code`]
//! on failure; [`error::persist_last_error_message`] carries the accompanying diagnostic text.

mod error;
mod file;
mod init;
mod kv;
mod notify;
mod types;

pub use error::{persist_clear_last_error, persist_last_error_message, StringSlice};
pub use file::*;
pub use init::*;
pub use kv::*;
pub use notify::*;
pub use types::*;

pub use persistence_core::INTERFACE_VERSION;
