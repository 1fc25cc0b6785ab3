//! Parsing of inbound client lines.
//!
//! A line is either plain chat text or a slash-command. Commands are split on
//! the first one or two whitespace boundaries; the third field is the
//! remainder of the line, unsplit, so message text may contain spaces.

use roomchat_core::RoomName;
use thiserror::Error;

/// Usage string for `/msg`.
pub const MSG_USAGE: &str = "Usage: /msg <user> <message>";

/// Usage string for `/join`.
pub const JOIN_USAGE: &str = "Usage: /join <room>";

/// A parsed client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain chat text for the current room.
    Say(String),
    /// `/list`: names of all live sessions.
    List,
    /// `/msg <user> <text>`: private message.
    Msg { to: String, text: String },
    /// `/join <room>`: move to a room.
    Join(RoomName),
    /// `/quit`: end the session.
    Quit,
}

/// Protocol errors. Each one is answered with a reply; none disconnects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// A known command was missing required arguments.
    #[error("{usage}")]
    Usage { usage: &'static str },

    /// A slash-command nobody recognizes.
    #[error("Unknown command")]
    Unknown { name: String },
}

impl Command {
    /// Parses one inbound line with its line terminator already removed.
    ///
    /// Any line not starting with `/` is chat text, including the empty line.
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        if !line.starts_with('/') {
            return Ok(Command::Say(line.to_string()));
        }

        let (name, rest) = split_field(line);
        let (first, remainder) = split_field(rest);

        match name {
            "/list" => Ok(Command::List),
            "/quit" => Ok(Command::Quit),
            "/msg" => {
                if first.is_empty() || remainder.is_empty() {
                    return Err(CommandError::Usage { usage: MSG_USAGE });
                }
                Ok(Command::Msg {
                    to: first.to_string(),
                    text: remainder.to_string(),
                })
            }
            "/join" => RoomName::new(first)
                .map(Command::Join)
                .map_err(|_| CommandError::Usage { usage: JOIN_USAGE }),
            other => Err(CommandError::Unknown {
                name: other.to_string(),
            }),
        }
    }
}

/// Splits off the first whitespace-delimited field.
///
/// Returns the field and the rest of the input with leading whitespace
/// removed. Whitespace inside the rest is preserved.
fn split_field(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((field, rest)) => (field, rest.trim_start()),
        None => (input, ""),
    }
}
