//! Dispatcher events and registry errors.
//!
//! This module defines the message types for communicating with the
//! `Dispatcher`:
//! - `RegistryEvent`: events submitted to the dispatcher's queue
//! - `RegistryError`: errors that can occur during registry operations
//!
//! Events that need an answer carry a oneshot sender; the rest are
//! fire-and-forget.

use roomchat_core::{ConnectionId, Outbox, RoomName, Session};
use thiserror::Error;
use tokio::sync::oneshot;

use super::state::RegistrySnapshot;

// ============================================================================
// Registry Events
// ============================================================================

/// Events processed by the dispatcher, strictly one at a time, in arrival
/// order.
#[derive(Debug)]
pub enum RegistryEvent {
    /// Add an authenticated session and announce it.
    ///
    /// # Errors
    /// - `RegistryError::SessionAlreadyExists` if the connection id is live
    /// - `RegistryError::NameInUse` if the display name is live
    Register {
        /// The session to add (boxed to keep the enum small)
        session: Box<Session>,
        /// Outbound queue used for fan-out to this session
        outbox: Outbox,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Remove a session, drop its outbox and announce the departure.
    ///
    /// Unknown ids are ignored, so repeating this is harmless.
    Unregister {
        /// Connection to remove
        id: ConnectionId,
    },

    /// Deliver text verbatim to every member of a room.
    Broadcast {
        /// Target room
        room: RoomName,
        /// Wire text, including its newline
        text: String,
    },

    /// Move a session into a room.
    ///
    /// # Errors
    /// - `RegistryError::SessionNotFound` if the session is gone
    Join {
        /// Session to move
        id: ConnectionId,
        /// Destination room
        room: RoomName,
        /// Channel receiving the previous room
        respond_to: oneshot::Sender<Result<Option<RoomName>, RegistryError>>,
    },

    /// Deliver a private message to the session named `to`.
    ///
    /// # Errors
    /// - `RegistryError::SessionNotFound` if the sender is gone
    /// - `RegistryError::UserNotFound` if no live session has that name
    DirectMessage {
        /// Sending session
        from: ConnectionId,
        /// Recipient display name
        to: String,
        /// Message text, without newline
        text: String,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Names of all live sessions.
    ListNames {
        /// Channel receiving the sorted names
        respond_to: oneshot::Sender<Vec<String>>,
    },

    /// Session count and `(name, room)` pairs for the status reporter.
    Snapshot {
        /// Channel receiving the snapshot
        respond_to: oneshot::Sender<RegistrySnapshot>,
    },

    /// Notify and drop every session, then stop the dispatcher.
    Shutdown {
        /// Channel receiving the number of sessions that were closed
        respond_to: oneshot::Sender<usize>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The requested session is not live.
    #[error("session not found: {0}")]
    SessionNotFound(ConnectionId),

    /// A session with this connection id is already live.
    #[error("session already exists: {0}")]
    SessionAlreadyExists(ConnectionId),

    /// Another live session already uses this display name.
    #[error("name already in use: {0}")]
    NameInUse(String),

    /// No live session has this display name.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// The dispatcher has stopped.
    #[error("dispatcher channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::SessionNotFound(ConnectionId::new(4));
        assert_eq!(err.to_string(), "session not found: conn-4");

        let err = RegistryError::SessionAlreadyExists(ConnectionId::new(5));
        assert_eq!(err.to_string(), "session already exists: conn-5");

        let err = RegistryError::NameInUse("alice".to_string());
        assert_eq!(err.to_string(), "name already in use: alice");

        let err = RegistryError::UserNotFound("bob".to_string());
        assert_eq!(err.to_string(), "user not found: bob");

        assert_eq!(
            RegistryError::ChannelClosed.to_string(),
            "dispatcher channel closed"
        );
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        // Dropping the responder without answering is observable
        let (tx, rx) = oneshot::channel::<Result<(), RegistryError>>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}
