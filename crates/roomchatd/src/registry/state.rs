//! Session and room membership tables.
//!
//! `Registry` is plain data with no synchronization of its own: the
//! dispatcher task owns the only instance and is the sole caller of every
//! mutating method. Sessions are stored once, keyed by connection id; rooms
//! and names are index sets of connection ids, never copies of sessions.
//!
//! # Invariants
//!
//! - A connection id is in at most one room's member set.
//! - `rooms[r]` equals `{ id : sessions[id].room == Some(r) }`.
//! - `names[n] == id` iff `sessions[id].name == n`.
//! - Member sets are never empty; the last leaver removes the room.

use std::collections::{HashMap, HashSet};

use roomchat_core::{ConnectionId, Outbox, RoomName, Session, SessionView};

use super::commands::RegistryError;

/// A live session together with the sending side of its outbound queue.
#[derive(Debug)]
pub struct Entry {
    pub session: Session,
    pub outbox: Outbox,
}

/// Point-in-time view of the registry for the status reporter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub sessions: Vec<SessionView>,
}

impl RegistrySnapshot {
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// The authoritative set of live sessions and room membership.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<ConnectionId, Entry>,
    names: HashMap<String, ConnectionId>,
    rooms: HashMap<RoomName, HashSet<ConnectionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Entry> {
        self.sessions.get(&id)
    }

    /// Inserts a session, placing it in its room if it has one.
    ///
    /// # Errors
    /// - `RegistryError::SessionAlreadyExists` if the connection id is live
    /// - `RegistryError::NameInUse` if another live session has the name
    pub fn insert(&mut self, session: Session, outbox: Outbox) -> Result<(), RegistryError> {
        let id = session.id();
        if self.sessions.contains_key(&id) {
            return Err(RegistryError::SessionAlreadyExists(id));
        }
        if self.names.contains_key(session.name()) {
            return Err(RegistryError::NameInUse(session.name().to_string()));
        }

        self.names.insert(session.name().to_string(), id);
        if let Some(room) = session.room() {
            self.rooms.entry(room.clone()).or_default().insert(id);
        }
        self.sessions.insert(id, Entry { session, outbox });
        Ok(())
    }

    /// Removes a session and its room membership in one step.
    ///
    /// Returns `None` if the id is not live, so removing twice is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Entry> {
        let entry = self.sessions.remove(&id)?;
        self.names.remove(entry.session.name());
        if let Some(room) = entry.session.room() {
            self.leave_room(room, id);
        }
        Some(entry)
    }

    /// Moves a session into `room`, leaving its previous room first.
    ///
    /// Returns the previous room.
    ///
    /// # Errors
    /// - `RegistryError::SessionNotFound` if the id is not live
    pub fn join(
        &mut self,
        id: ConnectionId,
        room: RoomName,
    ) -> Result<Option<RoomName>, RegistryError> {
        let entry = self
            .sessions
            .get_mut(&id)
            .ok_or(RegistryError::SessionNotFound(id))?;

        let previous = entry.session.set_room(Some(room.clone()));
        if let Some(old) = &previous {
            self.leave_room(old, id);
        }
        self.rooms.entry(room).or_default().insert(id);
        Ok(previous)
    }

    fn leave_room(&mut self, room: &RoomName, id: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    /// Live sessions currently in `room`.
    pub fn members<'a>(&'a self, room: &RoomName) -> impl Iterator<Item = &'a Entry> + 'a {
        self.rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.sessions.get(id))
    }

    /// Every live session.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.sessions.values()
    }

    /// Looks up a live session by display name.
    pub fn find_by_name(&self, name: &str) -> Option<&Entry> {
        self.names.get(name).and_then(|id| self.sessions.get(id))
    }

    /// Display names of all live sessions, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of rooms that currently have members, sorted.
    pub fn room_names(&self) -> Vec<RoomName> {
        let mut rooms: Vec<RoomName> = self.rooms.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut sessions: Vec<SessionView> =
            self.sessions.values().map(|e| e.session.view()).collect();
        sessions.sort_by_key(|view| view.id);
        RegistrySnapshot { sessions }
    }

    /// Removes every session, returning them.
    pub fn drain(&mut self) -> Vec<Entry> {
        self.names.clear();
        self.rooms.clear();
        self.sessions.drain().map(|(_, entry)| entry).collect()
    }

    /// Checks every invariant listed in the module docs.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let rooms_match_sessions = self.rooms.iter().all(|(room, members)| {
            !members.is_empty()
                && members.iter().all(|id| {
                    self.sessions
                        .get(id)
                        .is_some_and(|e| e.session.room() == Some(room))
                })
        });
        let sessions_match_rooms = self.sessions.iter().all(|(id, entry)| {
            let in_rooms = self.rooms.values().filter(|m| m.contains(id)).count();
            match entry.session.room() {
                Some(room) => in_rooms == 1 && self.rooms.get(room).is_some_and(|m| m.contains(id)),
                None => in_rooms == 0,
            }
        });
        let names_match = self.names.len() == self.sessions.len()
            && self
                .names
                .iter()
                .all(|(name, id)| self.sessions.get(id).is_some_and(|e| e.session.name() == name));

        rooms_match_sessions && sessions_match_rooms && names_match
    }
}
