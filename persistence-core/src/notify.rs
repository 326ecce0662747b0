// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! Change-notification registration and dispatch.
//!
//! At most one callback pointer is active process-wide, expressed as a compare-and-set on an
//! optional function pointer rather than a full multi-subscriber registry, matching
//! `Invariant 4` of the original contract. Dispatch happens on the supervisor dispatch loop's
//! thread (`persistence_ipc::dispatch`) — callbacks must not block it.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::{PersistenceError, Result};
use crate::types::{ChangeReason, ResourceKey};

/// A registered change callback. Applications pass this through the FFI boundary as a raw
/// function pointer plus an opaque context value; the core only needs to distinguish "the same
/// pointer" from "a different pointer" to enforce the one-callback rule.
pub type Callback = unsafe extern "C" fn(
    ldbid: u32,
    resource_id: *const std::os::raw::c_char,
    user_no: u32,
    seat_no: u32,
    reason: ChangeReason,
    context: *mut std::os::raw::c_void,
);

struct Registration {
    callback: Callback,
    context: usize,
    resources: HashSet<ResourceKey>,
}

#[derive(Default)]
pub struct NotificationBus {
    registration: Mutex<Option<Registration>>,
}

impl NotificationBus {
    /// Registers `callback` for `resource`. Rejects a second, *different* callback pointer with
    /// `NotifyNotAllowed`; re-registering the same pointer for more resources is allowed.
    pub fn register(&self, resource: ResourceKey, callback: Callback, context: *mut std::os::raw::c_void) -> Result<()> {
        let mut guard = self.registration.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_mut() {
            Some(existing) if existing.callback as usize == callback as usize => {
                existing.resources.insert(resource);
                Ok(())
            }
            Some(_) => Err(PersistenceError::NotifyNotAllowed),
            None => {
                let mut resources = HashSet::new();
                resources.insert(resource);
                *guard = Some(Registration {
                    callback,
                    context: context as usize,
                    resources,
                });
                Ok(())
            }
        }
    }

    /// Unregisters `resource` for the currently active callback. Clears the global registration
    /// entirely once its last resource is removed.
    pub fn unregister(&self, resource: &ResourceKey) {
        let mut guard = self.registration.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(registration) = guard.as_mut() {
            registration.resources.remove(resource);
            if registration.resources.is_empty() {
                *guard = None;
            }
        }
    }

    /// Returns the callback to invoke for `resource`, if one is registered for it.
    pub fn callback_for(&self, resource: &ResourceKey) -> Option<(Callback, *mut std::os::raw::c_void)> {
        let guard = self.registration.lock().unwrap_or_else(|p| p.into_inner());
        guard.as_ref().and_then(|registration| {
            registration
                .resources
                .contains(resource)
                .then_some((registration.callback, registration.context as *mut std::os::raw::c_void))
        })
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        let guard = self.registration.lock().unwrap_or_else(|p| p.into_inner());
        guard.as_ref().map_or(0, |r| r.resources.len())
    }
}

// SAFETY: the context pointer is only ever handed back to the same FFI caller that supplied it;
// the bus itself never dereferences it.
unsafe impl Send for NotificationBus {}
unsafe impl Sync for NotificationBus {}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn callback_a(
        _ldbid: u32,
        _resource_id: *const std::os::raw::c_char,
        _user_no: u32,
        _seat_no: u32,
        _reason: ChangeReason,
        _context: *mut std::os::raw::c_void,
    ) {
    }

    unsafe extern "C" fn callback_b(
        _ldbid: u32,
        _resource_id: *const std::os::raw::c_char,
        _user_no: u32,
        _seat_no: u32,
        _reason: ChangeReason,
        _context: *mut std::os::raw::c_void,
    ) {
    }

    #[test]
    fn second_distinct_callback_is_rejected() {
        let bus = NotificationBus::default();
        let key = ResourceKey::new(1, "r", 0, 0);
        bus.register(key.clone(), callback_a, std::ptr::null_mut()).unwrap();
        assert!(matches!(
            bus.register(key, callback_b, std::ptr::null_mut()),
            Err(PersistenceError::NotifyNotAllowed)
        ));
    }

    #[test]
    fn same_callback_can_register_multiple_resources() {
        let bus = NotificationBus::default();
        let r1 = ResourceKey::new(1, "r1", 0, 0);
        let r2 = ResourceKey::new(1, "r2", 0, 0);
        bus.register(r1, callback_a, std::ptr::null_mut()).unwrap();
        bus.register(r2, callback_a, std::ptr::null_mut()).unwrap();
        assert_eq!(bus.active_count(), 2);
    }

    #[test]
    fn unregister_last_resource_frees_the_callback_slot() {
        let bus = NotificationBus::default();
        let key = ResourceKey::new(1, "r", 0, 0);
        bus.register(key.clone(), callback_a, std::ptr::null_mut()).unwrap();
        bus.unregister(&key);
        assert_eq!(bus.active_count(), 0);
        bus.register(key, callback_b, std::ptr::null_mut()).unwrap();
    }

    #[test]
    fn callback_for_unregistered_resource_is_none() {
        let bus = NotificationBus::default();
        let key = ResourceKey::new(1, "r", 0, 0);
        assert!(bus.callback_for(&key).is_none());
    }
}
