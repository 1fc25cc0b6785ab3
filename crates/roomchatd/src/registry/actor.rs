//! Dispatcher actor - owns the registry and fans messages out.
//!
//! The Dispatcher is the single owner of the session registry. It receives
//! events via an unbounded mpsc channel, applies them one at a time, and
//! writes fan-out into each recipient's outbox.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the project panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Responder send failures are ignored; the requester may have gone away

use std::ops::ControlFlow;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use roomchat_core::{ConnectionId, Delivery, Outbox, RoomName, Session};
use roomchat_protocol::ServerMessage;

use super::commands::{RegistryError, RegistryEvent};
use super::state::{Entry, Registry};
use crate::config::NoticeScope;

// ============================================================================
// Dispatcher
// ============================================================================

/// The dispatcher actor - owns all registry state.
///
/// # Ordering
///
/// Events are handled strictly in the order they are received. A broadcast
/// therefore sees room membership exactly as left by every register,
/// unregister and join received before it.
///
/// # Fan-out
///
/// Writes go through [`Outbox::offer`], which never blocks: a slow recipient
/// loses messages instead of stalling the room.
pub struct Dispatcher {
    /// Event receiver
    receiver: mpsc::UnboundedReceiver<RegistryEvent>,

    /// Sessions, names and room membership
    registry: Registry,

    /// Recipients of join/leave notices
    notice_scope: NoticeScope,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving events
    /// * `notice_scope` - Who sees "joined/left the chat" notices
    pub fn new(receiver: mpsc::UnboundedReceiver<RegistryEvent>, notice_scope: NoticeScope) -> Self {
        Self {
            receiver,
            registry: Registry::new(),
            notice_scope,
        }
    }

    /// Runs the event loop.
    ///
    /// Processes events until a `Shutdown` event arrives or every sender is
    /// dropped. Call this in a spawned task.
    pub async fn run(mut self) {
        info!(notice_scope = ?self.notice_scope, "Dispatcher starting");

        while let Some(event) = self.receiver.recv().await {
            if self.handle_event(event).is_break() {
                break;
            }
        }

        info!(sessions = self.registry.len(), "Dispatcher stopped");
    }

    /// Applies a single event.
    fn handle_event(&mut self, event: RegistryEvent) -> ControlFlow<()> {
        match event {
            RegistryEvent::Register {
                session,
                outbox,
                respond_to,
            } => {
                let result = self.handle_register(*session, outbox);
                // Ignore send error - the handler may have gone away
                let _ = respond_to.send(result);
            }
            RegistryEvent::Unregister { id } => {
                self.handle_unregister(id);
            }
            RegistryEvent::Broadcast { room, text } => {
                self.handle_broadcast(&room, &text);
            }
            RegistryEvent::Join {
                id,
                room,
                respond_to,
            } => {
                let result = self.handle_join(id, room);
                let _ = respond_to.send(result);
            }
            RegistryEvent::DirectMessage {
                from,
                to,
                text,
                respond_to,
            } => {
                let result = self.handle_direct_message(from, &to, text);
                let _ = respond_to.send(result);
            }
            RegistryEvent::ListNames { respond_to } => {
                let _ = respond_to.send(self.registry.names());
            }
            RegistryEvent::Snapshot { respond_to } => {
                let _ = respond_to.send(self.registry.snapshot());
            }
            RegistryEvent::Shutdown { respond_to } => {
                let closed = self.handle_shutdown();
                let _ = respond_to.send(closed);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // ========================================================================
    // Event Handlers
    // ========================================================================

    fn handle_register(&mut self, session: Session, outbox: Outbox) -> Result<(), RegistryError> {
        let id = session.id();
        let name = session.name().to_string();
        let room = session.room().cloned();

        if let Err(e) = self.registry.insert(session, outbox) {
            warn!(connection = %id, user = %name, error = %e, "Rejected registration");
            return Err(e);
        }

        info!(
            connection = %id,
            user = %name,
            room = ?room.as_ref().map(RoomName::as_str),
            total_sessions = self.registry.len(),
            "Session registered"
        );

        let notice = ServerMessage::JoinedChat { name }.render();
        match (self.notice_scope, &room) {
            (NoticeScope::Global, _) => self.broadcast_all(&notice),
            (NoticeScope::Room, Some(room)) => self.handle_broadcast(room, &notice),
            (NoticeScope::Room, None) => {
                if let Some(entry) = self.registry.get(id) {
                    deliver(entry, &notice);
                }
            }
        }

        Ok(())
    }

    fn handle_unregister(&mut self, id: ConnectionId) {
        let Some(entry) = self.registry.remove(id) else {
            debug!(connection = %id, "Unregister for unknown session, ignoring");
            return;
        };

        let Entry { session, outbox } = entry;
        // Dropping the registry's outbox lets the writer task finish and
        // close the connection once the handler's copy is gone too.
        drop(outbox);

        info!(
            connection = %id,
            user = %session.name(),
            total_sessions = self.registry.len(),
            "Session unregistered"
        );

        let notice = ServerMessage::LeftChat {
            name: session.name().to_string(),
        }
        .render();
        match (self.notice_scope, session.room()) {
            (NoticeScope::Global, _) => self.broadcast_all(&notice),
            (NoticeScope::Room, Some(room)) => self.handle_broadcast(room, &notice),
            (NoticeScope::Room, None) => {}
        }
    }

    fn handle_broadcast(&self, room: &RoomName, text: &str) {
        let mut delivered = 0usize;
        let mut dropped = 0usize;

        for entry in self.registry.members(room) {
            if deliver(entry, text).is_queued() {
                delivered += 1;
            } else {
                dropped += 1;
            }
        }

        debug!(room = %room, delivered, dropped, "Broadcast");
    }

    fn broadcast_all(&self, text: &str) {
        for entry in self.registry.entries() {
            deliver(entry, text);
        }
    }

    fn handle_join(
        &mut self,
        id: ConnectionId,
        room: RoomName,
    ) -> Result<Option<RoomName>, RegistryError> {
        let previous = self.registry.join(id, room.clone())?;
        debug!(
            connection = %id,
            from = ?previous.as_ref().map(RoomName::as_str),
            to = %room,
            "Session joined room"
        );
        Ok(previous)
    }

    fn handle_direct_message(
        &self,
        from: ConnectionId,
        to: &str,
        text: String,
    ) -> Result<(), RegistryError> {
        let sender = self
            .registry
            .get(from)
            .ok_or(RegistryError::SessionNotFound(from))?;
        let recipient = self
            .registry
            .find_by_name(to)
            .ok_or_else(|| RegistryError::UserNotFound(to.to_string()))?;

        let message = ServerMessage::PrivateFrom {
            name: sender.session.name().to_string(),
            text,
        };
        deliver(recipient, &message.render());
        Ok(())
    }

    fn handle_shutdown(&mut self) -> usize {
        let notice = ServerMessage::ShuttingDown.render();
        let entries = self.registry.drain();
        let closed = entries.len();

        for entry in &entries {
            deliver(entry, &notice);
        }

        info!(closed, "Registry discarded on shutdown");
        closed
    }

    /// Returns the number of live sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }
}

/// Best-effort write to one recipient. Drops are logged, never retried.
fn deliver(entry: &Entry, text: &str) -> Delivery {
    let delivery = entry.outbox.offer(text);
    if !delivery.is_queued() {
        debug!(
            connection = %entry.session.id(),
            user = %entry.session.name(),
            delivery = ?delivery,
            "Dropped message"
        );
    }
    delivery
}
