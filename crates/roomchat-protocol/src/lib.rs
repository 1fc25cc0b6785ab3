//! roomchat Protocol - Line protocol for chat clients
//!
//! Every message in either direction is UTF-8 text terminated by a single
//! newline. This crate parses inbound lines into [`Command`]s and renders
//! every outbound [`ServerMessage`].

pub mod command;
pub mod reply;

pub use command::{Command, CommandError, JOIN_USAGE, MSG_USAGE};
pub use reply::ServerMessage;

/// Strips one trailing line terminator (`\n` or `\r\n`).
pub fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_line_ending() {
        assert_eq!(strip_line_ending("hi\n"), "hi");
        assert_eq!(strip_line_ending("hi\r\n"), "hi");
        assert_eq!(strip_line_ending("hi"), "hi");
        assert_eq!(strip_line_ending("\n"), "");
        assert_eq!(strip_line_ending("  spaced  \n"), "  spaced  ");
    }
}
