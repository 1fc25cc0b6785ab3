//! Server-to-client text.
//!
//! Every message the server sends is produced here. Rendering a
//! [`ServerMessage`] yields the exact bytes that go on the wire, including the
//! trailing newline. Prompts are the only text without one.

use std::fmt;

use roomchat_core::RoomName;

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Username prompt (no newline)
    UsernamePrompt,

    /// Password prompt (no newline)
    PasswordPrompt,

    /// Known user, secret matched
    Authenticated,

    /// Unknown user, credentials stored
    Registered,

    /// Known user, secret did not match
    InvalidPassword,

    /// Username was empty or contained whitespace
    InvalidUsername,

    /// Another live session already uses this name
    AlreadyConnected { name: String },

    /// Lifecycle notice when a session registers
    JoinedChat { name: String },

    /// Lifecycle notice when a session unregisters
    LeftChat { name: String },

    /// Room chat line
    Chat {
        room: RoomName,
        name: String,
        text: String,
    },

    /// Direct message, as seen by the recipient
    PrivateFrom { name: String, text: String },

    /// Direct message confirmation, as seen by the sender
    PrivateTo { name: String, text: String },

    /// Names of all live sessions, one per line
    UserList { names: Vec<String> },

    /// Reply to `/join`
    JoinedRoom { room: RoomName },

    /// Chat text sent outside any room
    JoinRoomFirst,

    /// `/msg` target has no live session
    UserNotFound { name: String },

    /// Command missing arguments
    Usage { usage: &'static str },

    /// Unrecognized slash-command
    UnknownCommand,

    /// Inbound line exceeded the configured limit
    LineTooLong { max: usize },

    /// Reply to `/quit`
    Goodbye,

    /// Sent to every live session when the server stops
    ShuttingDown,
}

impl ServerMessage {
    /// Creates a room chat line.
    pub fn chat(room: &RoomName, name: &str, text: &str) -> Self {
        Self::Chat {
            room: room.clone(),
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    /// Renders the message as wire text.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsernamePrompt => f.write_str("Enter your username: "),
            Self::PasswordPrompt => f.write_str("Enter your password: "),
            Self::Authenticated => f.write_str("Authentication Successful.\n"),
            Self::Registered => {
                f.write_str("Registration successful. You are now authenticated.\n")
            }
            Self::InvalidPassword => f.write_str("Invalid Password.\n"),
            Self::InvalidUsername => f.write_str("Invalid username.\n"),
            Self::AlreadyConnected { name } => writeln!(f, "User {name} is already connected."),
            Self::JoinedChat { name } => writeln!(f, "{name} joined the chat"),
            Self::LeftChat { name } => writeln!(f, "{name} left the chat"),
            Self::Chat { room, name, text } => writeln!(f, "[{room}] {name}: {text}"),
            Self::PrivateFrom { name, text } => writeln!(f, "Private from {name}: {text}"),
            Self::PrivateTo { name, text } => writeln!(f, "Private to {name}: {text}"),
            Self::UserList { names } => {
                for name in names {
                    writeln!(f, "{name}")?;
                }
                Ok(())
            }
            Self::JoinedRoom { room } => writeln!(f, "Joined room {room}"),
            Self::JoinRoomFirst => {
                f.write_str("Join a room to start chatting. Use /join <room> to join a room.\n")
            }
            Self::UserNotFound { name } => writeln!(f, "User {name} not found"),
            Self::Usage { usage } => writeln!(f, "{usage}"),
            Self::UnknownCommand => f.write_str("Unknown command\n"),
            Self::LineTooLong { max } => writeln!(f, "Message too long (max {max} bytes)"),
            Self::Goodbye => f.write_str("Goodbye.\n"),
            Self::ShuttingDown => f.write_str("Server is shutting down...\n"),
        }
    }
}
