// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! The init/deinit/shutdown state machine and its orthogonal access-lock flag.
//!
//! ```text
//! Uninitialized --init()-->           Initializing
//! Initializing  --register-ok-->      Initialized
//! Initialized   --prepare-shutdown--> ShutdownPending     (from supervisor)
//! Initialized   --user SHUTDOWN-->    ShutdownPending     (only if shutdown_mode=None)
//! ShutdownPending --writeback-done--> ShutdownCompleted
//! ShutdownPending --user CANCEL-->    Initialized         (if cancel_budget>0, decrement)
//! Any           --deinit()-->         Uninitialized
//! ```

use std::sync::Mutex;

use crate::error::{PersistenceError, Result};
use crate::types::{AccessLock, LifecycleOp, ShutdownMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Initializing,
    Initialized,
    ShutdownPending,
    ShutdownCompleted,
}

struct Inner {
    state: State,
    shutdown_mode: ShutdownMode,
    access_lock: AccessLock,
    cancel_budget: u32,
}

/// The process-wide lifecycle state machine. One instance lives for the process's lifetime; its
/// fields reset across `init`/`deinit` cycles rather than the instance being recreated, so a
/// handle to it can be held for the whole program.
pub struct Lifecycle {
    inner: Mutex<Inner>,
    max_cancel: u32,
}

impl Lifecycle {
    pub fn new(max_cancel: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Uninitialized,
                shutdown_mode: ShutdownMode::None,
                access_lock: AccessLock::None,
                cancel_budget: max_cancel,
            }),
            max_cancel,
        }
    }

    /// `Uninitialized -> Initializing`. Fails if `init()` has already run for this process.
    pub fn begin_init(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.state != State::Uninitialized {
            return Err(PersistenceError::Common(anyhow::anyhow!("already initialized")));
        }
        inner.state = State::Initializing;
        Ok(())
    }

    /// `Initializing -> Initialized`, recording the negotiated `shutdown_mode`.
    pub fn complete_init(&self, shutdown_mode: ShutdownMode) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state = State::Initialized;
        inner.shutdown_mode = shutdown_mode;
        inner.access_lock = AccessLock::None;
        inner.cancel_budget = self.max_cancel;
    }

    /// Resets to `Uninitialized` from any state, as `deinit()`'s final action.
    pub fn deinit(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state = State::Uninitialized;
        inner.shutdown_mode = ShutdownMode::None;
        inner.access_lock = AccessLock::None;
        inner.cancel_budget = self.max_cancel;
    }

    /// Checked at every public key/value and file entry point.
    pub fn require_accessible(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.state != State::Initialized && inner.state != State::ShutdownPending {
            return Err(PersistenceError::NotInitialized);
        }
        if inner.access_lock != AccessLock::None {
            return Err(PersistenceError::LockedFs);
        }
        Ok(())
    }

    /// Supervisor-driven `prepare-shutdown`: `Initialized -> ShutdownPending`, blocking access.
    pub fn on_prepare_shutdown(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.state != State::Initialized {
            return Err(PersistenceError::Common(anyhow::anyhow!(
                "prepare-shutdown received outside the Initialized state"
            )));
        }
        inner.state = State::ShutdownPending;
        inner.access_lock = AccessLock::Full;
        Ok(())
    }

    /// Supervisor-driven `writeback-done`: `ShutdownPending -> ShutdownCompleted`.
    pub fn on_writeback_done(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.state != State::ShutdownPending {
            return Err(PersistenceError::Common(anyhow::anyhow!(
                "writeback-done received outside ShutdownPending"
            )));
        }
        inner.state = State::ShutdownCompleted;
        Ok(())
    }

    /// Administrative `block-and-writeback` / `unblock` channel, independent of the state machine.
    pub fn set_access_lock(&self, lock: AccessLock) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.access_lock = lock;
    }

    /// The user-initiated `lifecycle_set(SHUTDOWN | CANCEL)` entry point. Only legal when no
    /// supervisor is managing this process's lifecycle (`shutdown_mode == None`); otherwise the
    /// supervisor's own `prepare-shutdown`/cancel channel is authoritative.
    pub fn lifecycle_set(&self, op: LifecycleOp) -> Result<i32> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.shutdown_mode != ShutdownMode::None {
            return Err(PersistenceError::ShutdownNoPermit);
        }
        match op {
            LifecycleOp::Shutdown => {
                if inner.state != State::Initialized {
                    return Err(PersistenceError::ShutdownNoPermit);
                }
                inner.state = State::ShutdownPending;
                inner.access_lock = AccessLock::Full;
                Ok(1)
            }
            LifecycleOp::Cancel => {
                if inner.state != State::ShutdownPending {
                    return Err(PersistenceError::ShutdownNoPermit);
                }
                if inner.cancel_budget == 0 {
                    return Err(PersistenceError::ShutdownMaxCancel);
                }
                inner.cancel_budget -= 1;
                inner.state = State::Initialized;
                inner.access_lock = AccessLock::None;
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized(max_cancel: u32) -> Lifecycle {
        let lifecycle = Lifecycle::new(max_cancel);
        lifecycle.begin_init().unwrap();
        lifecycle.complete_init(ShutdownMode::None);
        lifecycle
    }

    #[test]
    fn fresh_instance_rejects_access_before_init() {
        let lifecycle = Lifecycle::new(3);
        assert!(matches!(lifecycle.require_accessible(), Err(PersistenceError::NotInitialized)));
    }

    #[test]
    fn initialized_instance_allows_access() {
        let lifecycle = initialized(3);
        assert!(lifecycle.require_accessible().is_ok());
    }

    #[test]
    fn shutdown_locks_access_and_cancel_restores_it() {
        let lifecycle = initialized(3);
        assert_eq!(lifecycle.lifecycle_set(LifecycleOp::Shutdown).unwrap(), 1);
        assert!(matches!(lifecycle.require_accessible(), Err(PersistenceError::LockedFs)));
        assert_eq!(lifecycle.lifecycle_set(LifecycleOp::Cancel).unwrap(), 1);
        assert!(lifecycle.require_accessible().is_ok());
    }

    #[test]
    fn cancel_budget_is_exhausted_after_max_count() {
        let lifecycle = initialized(2);
        for _ in 0..2 {
            lifecycle.lifecycle_set(LifecycleOp::Shutdown).unwrap();
            lifecycle.lifecycle_set(LifecycleOp::Cancel).unwrap();
        }
        lifecycle.lifecycle_set(LifecycleOp::Shutdown).unwrap();
        assert!(matches!(
            lifecycle.lifecycle_set(LifecycleOp::Cancel),
            Err(PersistenceError::ShutdownMaxCancel)
        ));
    }

    #[test]
    fn lifecycle_set_is_refused_when_a_supervisor_owns_the_shutdown_path() {
        let lifecycle = Lifecycle::new(3);
        lifecycle.begin_init().unwrap();
        lifecycle.complete_init(ShutdownMode::Normal);
        assert!(matches!(
            lifecycle.lifecycle_set(LifecycleOp::Shutdown),
            Err(PersistenceError::ShutdownNoPermit)
        ));
    }

    #[test]
    fn deinit_resets_state_for_a_subsequent_init() {
        let lifecycle = initialized(3);
        lifecycle.deinit();
        assert!(matches!(lifecycle.require_accessible(), Err(PersistenceError::NotInitialized)));
        lifecycle.begin_init().unwrap();
        lifecycle.complete_init(ShutdownMode::None);
        assert!(lifecycle.require_accessible().is_ok());
    }

    #[test]
    fn supervisor_driven_prepare_shutdown_then_writeback_done() {
        let lifecycle = initialized(3);
        lifecycle.on_prepare_shutdown().unwrap();
        assert!(matches!(lifecycle.require_accessible(), Err(PersistenceError::LockedFs)));
        lifecycle.on_writeback_done().unwrap();
    }
}
