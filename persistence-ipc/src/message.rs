// Unless explicitly stated otherwise all files in this repository are licensed under the Apache
// License Version 2.0. This product includes software developed by the persistence-rs project.

//! The wire protocol spoken between this library and the external lifecycle/admin supervisor.
//!
//! The supervisor transport itself (the message bus) is out of scope for this library; what is in
//! scope is the small, stable set of messages it carries. They are modeled as a Unix domain socket
//! carrying length-prefixed `bincode`-serialized values of [`SupervisorMessage`].

use serde::{Deserialize, Serialize};

/// A lifecycle request identifier, correlating a `LifecycleRequest` with its eventual
/// `LifecycleRequestComplete`.
pub type RequestId = u64;

/// The kind of lifecycle request the supervisor is issuing to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleRequestKind {
    PrepareShutdown,
    BlockAndWriteback,
}

/// Messages exchanged over the supervisor socket, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SupervisorMessage {
    /// Sent by this process at `init()` when `shutdown_mode` requests lifecycle notifications.
    RegisterShutdownClient { app_name: String },
    /// Sent by this process at `deinit()`.
    UnregisterShutdownClient,
    /// Sent by the supervisor to request a lifecycle transition.
    LifecycleRequest {
        request: LifecycleRequestKind,
        request_id: RequestId,
    },
    /// Sent by this process once it has acted on a `LifecycleRequest`.
    LifecycleRequestComplete { request_id: RequestId, status: i32 },
    /// Sent by the supervisor's administrative channel to force a full access block.
    BlockAndWriteBack,
    /// Sent by the supervisor's administrative channel to lift a prior block.
    Unblock,
}

/// Commands a local application thread enqueues onto the dispatch loop. These never cross
/// the supervisor socket; they are the "internal command handler" side of the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchCommand {
    /// A local write/delete completed; fan it out as a change notification.
    NotifyChanged {
        ldbid: u32,
        resource_id: String,
        user_no: u32,
        seat_no: u32,
    },
    /// Tell the supervisor this process finished writeback for `request_id`.
    WritebackComplete { request_id: RequestId, status: i32 },
    /// Stop the dispatch loop.
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_round_trip_through_bincode() {
        let msg = SupervisorMessage::LifecycleRequest {
            request: LifecycleRequestKind::PrepareShutdown,
            request_id: 42,
        };
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: SupervisorMessage = bincode::deserialize(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }
}
