//! Message types for the broadcast scheduler.

use std::sync::Arc;

use bytes::Bytes;
use fanout_core::SessionId;
use ractor::RpcReplyPort;
use tokio::sync::OwnedSemaphorePermit;

use crate::session::Session;

/// Requests serialized through the scheduler's mailbox.
///
/// Each request carries the admission permit that bounded its submission;
/// the permit is released once the scheduler has handled the request.
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Add a session to the registry and send it the welcome message.
    Register {
        session: Arc<Session>,
        permit: OwnedSemaphorePermit,
        reply: RpcReplyPort<bool>,
    },

    /// Remove a session from the registry and every topic.
    Unregister {
        session_id: SessionId,
        permit: OwnedSemaphorePermit,
        reply: RpcReplyPort<bool>,
    },

    /// Deliver an encoded envelope to every active session.
    Broadcast {
        message: Bytes,
        permit: OwnedSemaphorePermit,
    },

    /// Unregister every session and stop.
    Shutdown {
        permit: OwnedSemaphorePermit,
        reply: RpcReplyPort<usize>,
    },
}
