// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::todo, clippy::unimplemented)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Transport and dispatch loop for the external lifecycle/admin supervisor protocol.
//!
//! This crate knows nothing about keys, files, or resource tables; it only knows how to speak the
//! wire protocol in [`message`] over a Unix domain socket and run the background dispatch loop
//! that keeps that connection alive.

#[cfg(unix)]
pub mod dispatch;
pub mod message;
#[cfg(unix)]
pub mod transport;

#[cfg(unix)]
pub use dispatch::{Dispatcher, SupervisorSink};
pub use message::{DispatchCommand, LifecycleRequestKind, RequestId, SupervisorMessage};
