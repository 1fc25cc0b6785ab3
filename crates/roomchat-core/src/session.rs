//! Session domain entities and value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identity of one accepted connection.
///
/// Assigned by the accept loop from a monotonically increasing counter, so
/// two connections never share an id for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Name of a chat room.
///
/// A room name is a single word: non-empty and free of whitespace, because
/// `/join <room>` takes exactly one field. "No room" is expressed as
/// `Option<RoomName>::None`, never as an empty name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
    /// Creates a room name, rejecting empty names and names with whitespace.
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if is_single_word(&name) {
            Ok(Self(name))
        } else {
            Err(DomainError::InvalidRoomName { name })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomName> for String {
    fn from(room: RoomName) -> Self {
        room.0
    }
}

impl AsRef<str> for RoomName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Checks that a username can be used as a display name.
///
/// Usernames are addressed by `/msg <user>`, so they follow the same
/// single-word rule as room names.
pub fn validate_username(name: &str) -> DomainResult<&str> {
    if is_single_word(name) {
        Ok(name)
    } else {
        Err(DomainError::InvalidUsername {
            name: name.to_string(),
        })
    }
}

fn is_single_word(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

// ============================================================================
// Session
// ============================================================================

/// Server-side state for one connected, authenticated client.
///
/// The display name is fixed at construction. Only the room changes over the
/// session's lifetime, and only the registry changes it, together with the
/// room membership index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: ConnectionId,
    name: String,
    room: Option<RoomName>,
    authenticated: bool,
    connected_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session for a connection that passed authentication.
    pub fn authenticated(id: ConnectionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            room: None,
            authenticated: true,
            connected_at: Utc::now(),
        }
    }

    /// Places the session in a room before it is registered.
    #[must_use]
    pub fn with_room(mut self, room: Option<RoomName>) -> Self {
        self.room = room;
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn room(&self) -> Option<&RoomName> {
        self.room.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Moves the session to another room, returning the previous one.
    ///
    /// Callers must update room membership in the same step.
    pub fn set_room(&mut self, room: Option<RoomName>) -> Option<RoomName> {
        std::mem::replace(&mut self.room, room)
    }

    pub fn view(&self) -> SessionView {
        SessionView::from_session(self)
    }
}

/// Read-only snapshot of a session, as shown by the status reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: ConnectionId,
    pub name: String,
    pub room: Option<RoomName>,
    pub connected_at: DateTime<Utc>,
}

impl SessionView {
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.id,
            name: session.name.clone(),
            room: session.room.clone(),
            connected_at: session.connected_at,
        }
    }

    /// Room label for display; sessions outside any room show an empty label.
    pub fn room_label(&self) -> &str {
        self.room.as_ref().map(RoomName::as_str).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
        assert_eq!(ConnectionId::new(7).as_u64(), 7);
    }

    #[test]
    fn test_room_name_validation() {
        assert!(RoomName::new("lobby").is_ok());
        assert_eq!(
            RoomName::new(""),
            Err(DomainError::InvalidRoomName {
                name: String::new()
            })
        );
        assert!(RoomName::new("two words").is_err());
        assert!(RoomName::new("tab\there").is_err());
    }

    #[test]
    fn test_room_name_try_from_string() {
        let room: RoomName = String::from("games").try_into().unwrap();
        assert_eq!(room.as_str(), "games");
        assert_eq!(String::from(room), "games");
    }

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("alice"), Ok("alice"));
        assert!(validate_username("").is_err());
        assert!(validate_username("alice smith").is_err());
    }

    #[test]
    fn test_new_session_has_no_room() {
        let session = Session::authenticated(ConnectionId::new(1), "alice");
        assert_eq!(session.name(), "alice");
        assert!(session.room().is_none());
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_set_room_returns_previous() {
        let lobby = RoomName::new("lobby").unwrap();
        let games = RoomName::new("games").unwrap();
        let mut session =
            Session::authenticated(ConnectionId::new(1), "alice").with_room(Some(lobby.clone()));

        let previous = session.set_room(Some(games.clone()));
        assert_eq!(previous, Some(lobby));
        assert_eq!(session.room(), Some(&games));
    }

    #[test]
    fn test_view_room_label() {
        let session = Session::authenticated(ConnectionId::new(3), "bob");
        assert_eq!(session.view().room_label(), "");

        let session = session.with_room(Some(RoomName::new("lobby").unwrap()));
        let view = session.view();
        assert_eq!(view.room_label(), "lobby");
        assert_eq!(view.name, "bob");
        assert_eq!(view.id, ConnectionId::new(3));
    }
}
