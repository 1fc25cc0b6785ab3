//! Client interface for submitting events to the Dispatcher.
//!
//! The `RegistryHandle` is a cheap-to-clone sender shared by every session
//! handler, the status reporter and the server's shutdown path. Nothing else
//! can reach the registry.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed` or to an
//!   empty result

use tokio::sync::{mpsc, oneshot};

use roomchat_core::{ConnectionId, Outbox, RoomName, Session};

use super::commands::{RegistryError, RegistryEvent};
use super::state::RegistrySnapshot;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for submitting events to the dispatcher.
///
/// The event channel is unbounded, so submitting never waits on the
/// dispatcher; only request/response methods await its answer.
#[derive(Clone)]
pub struct RegistryHandle {
    /// Event sender to the dispatcher
    sender: mpsc::UnboundedSender<RegistryEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(sender: mpsc::UnboundedSender<RegistryEvent>) -> Self {
        Self { sender }
    }

    /// Register an authenticated session.
    ///
    /// # Errors
    ///
    /// - `RegistryError::SessionAlreadyExists` if the connection id is live
    /// - `RegistryError::NameInUse` if the display name is live
    /// - `RegistryError::ChannelClosed` if the dispatcher has stopped
    pub async fn register(&self, session: Session, outbox: Outbox) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryEvent::Register {
                session: Box::new(session),
                outbox,
                respond_to: tx,
            })
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Unregister a session.
    ///
    /// Fire-and-forget: unknown ids are ignored by the dispatcher and a
    /// stopped dispatcher has nothing left to remove.
    pub fn unregister(&self, id: ConnectionId) {
        let _ = self.sender.send(RegistryEvent::Unregister { id });
    }

    /// Deliver wire text to every member of `room`.
    ///
    /// Fire-and-forget, best-effort delivery.
    pub fn broadcast(&self, room: RoomName, text: String) {
        let _ = self.sender.send(RegistryEvent::Broadcast { room, text });
    }

    /// Move a session into `room`, returning its previous room.
    ///
    /// # Errors
    ///
    /// - `RegistryError::SessionNotFound` if the session is no longer live
    /// - `RegistryError::ChannelClosed` if the dispatcher has stopped
    pub async fn join(
        &self,
        id: ConnectionId,
        room: RoomName,
    ) -> Result<Option<RoomName>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryEvent::Join {
                id,
                room,
                respond_to: tx,
            })
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Send a private message from session `from` to the session named `to`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::UserNotFound` if no live session has that name
    /// - `RegistryError::SessionNotFound` if the sender is no longer live
    /// - `RegistryError::ChannelClosed` if the dispatcher has stopped
    pub async fn direct_message(
        &self,
        from: ConnectionId,
        to: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryEvent::DirectMessage {
                from,
                to: to.into(),
                text: text.into(),
                respond_to: tx,
            })
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Names of all live sessions, sorted.
    ///
    /// Returns an empty vector if the dispatcher has stopped.
    pub async fn list_names(&self) -> Vec<String> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryEvent::ListNames { respond_to: tx })
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Snapshot of live sessions for the status reporter.
    ///
    /// Returns an empty snapshot if the dispatcher has stopped.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryEvent::Snapshot { respond_to: tx })
            .is_err()
        {
            return RegistrySnapshot::default();
        }

        rx.await.unwrap_or_default()
    }

    /// Notify and close every session, then stop the dispatcher.
    ///
    /// Returns the number of sessions closed, or 0 if the dispatcher had
    /// already stopped.
    pub async fn shutdown(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryEvent::Shutdown { respond_to: tx })
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Check if the dispatcher is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
