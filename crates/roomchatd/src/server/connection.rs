//! Session handler for individual client connections.
//!
//! Each accepted connection gets its own `SessionHandler` that:
//! - Performs the username/password handshake
//! - Registers the session with the dispatcher
//! - Reads lines and interprets chat text and slash-commands
//! - Unregisters the session when the connection ends
//!
//! # Connection ownership
//!
//! The handler owns the read half. The write half belongs to the writer task
//! spawned next to it; the handler and the dispatcher only ever queue text in
//! the session's outbox. Each half is therefore closed exactly once, by its
//! single owner.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in an orderly disconnect

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use roomchat_core::session::validate_username;
use roomchat_core::{AuthOutcome, ConnectionId, CredentialStore, Outbox, RoomName, Session};
use roomchat_protocol::{strip_line_ending, Command, CommandError, ServerMessage};

use crate::config::Config;
use crate::registry::{RegistryError, RegistryHandle};

/// Per-connection settings derived from the daemon config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Room new sessions start in
    pub default_room: Option<RoomName>,
    /// Pending writes buffered per session
    pub outbox_capacity: usize,
    /// Upper bound for a single socket write
    pub write_timeout: Duration,
    /// Longest accepted inbound line, excluding the terminator
    pub max_line_length: usize,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_room: config
                .default_room
                .as_deref()
                .and_then(|room| RoomName::new(room).ok()),
            outbox_capacity: config.outbox_capacity,
            write_timeout: config.write_timeout(),
            max_line_length: config.max_line_length,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Shared services every session handler needs.
#[derive(Clone)]
pub struct ConnectionContext {
    pub registry: RegistryHandle,
    pub credentials: Arc<dyn CredentialStore>,
    pub settings: Arc<SessionSettings>,
}

/// Handshake and session lifecycle.
///
/// ```text
/// Connecting ──▶ Authenticating ──▶ Active ──▶ Closed
///                      │                         ▲
///                      └──── rejected ───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Active,
    Closed,
}

/// One inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Text(String),
    TooLong,
}

/// State of a registered session that only its handler changes.
#[derive(Debug)]
struct ActiveSession {
    name: String,
    room: Option<RoomName>,
}

/// Session handler for a single client.
pub struct SessionHandler<R> {
    /// Connection identity
    id: ConnectionId,

    /// Buffered reader for incoming lines
    reader: BufReader<R>,

    /// This session's outbound queue
    outbox: Outbox,

    /// Registry, credentials and settings
    context: ConnectionContext,

    /// Cancelled on server shutdown or when the writer fails
    cancel_token: CancellationToken,

    /// Current lifecycle state
    state: ConnectionState,
}

impl<R> SessionHandler<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a new session handler.
    ///
    /// # Arguments
    ///
    /// * `id` - Identity assigned by the accept loop
    /// * `reader` - Read half of the connection
    /// * `outbox` - The session's outbound queue
    /// * `context` - Shared registry, credential store and settings
    /// * `cancel_token` - Token ending the session from outside
    pub fn new(
        id: ConnectionId,
        reader: R,
        outbox: Outbox,
        context: ConnectionContext,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            id,
            reader: BufReader::new(reader),
            outbox,
            context,
            cancel_token,
            state: ConnectionState::Connecting,
        }
    }

    /// Runs the handler until the connection closes.
    ///
    /// Returns the final state, which is always `Closed`.
    pub async fn run(mut self) -> ConnectionState {
        debug!(connection = %self.id, "New client connected");

        let cancel = self.cancel_token.clone();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(ConnectionError::Cancelled),
            result = self.authenticate() => result,
        };

        let name = match outcome {
            Ok(Some(name)) => name,
            Ok(None) => return self.close(),
            Err(e) => {
                debug!(connection = %self.id, error = %e, "Handshake ended");
                return self.close();
            }
        };

        let mut active = match self.register(name).await {
            Some(active) => active,
            None => return self.close(),
        };

        self.transition(ConnectionState::Active);
        info!(connection = %self.id, user = %active.name, "Client authenticated");

        match self.process_lines(&mut active).await {
            Ok(()) => debug!(connection = %self.id, "Client quit"),
            Err(e) => debug!(connection = %self.id, error = %e, "Connection closed"),
        }

        self.context.registry.unregister(self.id);
        info!(connection = %self.id, user = %active.name, "Client disconnected");
        self.close()
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(connection = %self.id, from = ?self.state, to = ?next, "State change");
        self.state = next;
    }

    fn close(mut self) -> ConnectionState {
        self.transition(ConnectionState::Closed);
        self.state
    }

    /// Prompts for credentials and checks them.
    ///
    /// Returns the username on success, `None` if the attempt was rejected.
    async fn authenticate(&mut self) -> Result<Option<String>, ConnectionError> {
        self.transition(ConnectionState::Authenticating);

        self.reply(ServerMessage::UsernamePrompt).await;
        let username = self.read_text().await?.trim().to_string();
        self.reply(ServerMessage::PasswordPrompt).await;
        let secret = self.read_text().await?.trim().to_string();

        if validate_username(&username).is_err() {
            debug!(connection = %self.id, "Rejected invalid username");
            self.reply(ServerMessage::InvalidUsername).await;
            return Ok(None);
        }

        match self.context.credentials.authenticate(&username, &secret).await {
            AuthOutcome::Registered => self.reply(ServerMessage::Registered).await,
            AuthOutcome::Authenticated => self.reply(ServerMessage::Authenticated).await,
            AuthOutcome::Rejected => {
                info!(connection = %self.id, user = %username, "Authentication rejected");
                self.reply(ServerMessage::InvalidPassword).await;
                return Ok(None);
            }
        }

        Ok(Some(username))
    }

    /// Submits the `Register` event for an authenticated user.
    async fn register(&mut self, name: String) -> Option<ActiveSession> {
        let room = self.context.settings.default_room.clone();
        let session = Session::authenticated(self.id, name.as_str()).with_room(room.clone());

        match self
            .context
            .registry
            .register(session, self.outbox.clone())
            .await
        {
            Ok(()) => Some(ActiveSession { name, room }),
            Err(RegistryError::NameInUse(name)) => {
                self.reply(ServerMessage::AlreadyConnected { name }).await;
                None
            }
            Err(e) => {
                warn!(connection = %self.id, error = %e, "Registration failed");
                None
            }
        }
    }

    /// Main line loop.
    ///
    /// Returns `Ok` on `/quit` and an error when the connection ends any
    /// other way.
    async fn process_lines(&mut self, active: &mut ActiveSession) -> Result<(), ConnectionError> {
        let cancel = self.cancel_token.clone();

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
                line = self.read_line() => line?,
            };

            match line {
                Line::TooLong => {
                    let max = self.context.settings.max_line_length;
                    self.reply(ServerMessage::LineTooLong { max }).await;
                }
                Line::Text(text) => {
                    if self.interpret(active, &text).await?.is_break() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Applies one inbound line for an active session.
    async fn interpret(
        &mut self,
        active: &mut ActiveSession,
        line: &str,
    ) -> Result<ControlFlow<()>, ConnectionError> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(CommandError::Usage { usage }) => {
                self.reply(ServerMessage::Usage { usage }).await;
                return Ok(ControlFlow::Continue(()));
            }
            Err(CommandError::Unknown { name }) => {
                debug!(connection = %self.id, command = %name, "Unknown command");
                self.reply(ServerMessage::UnknownCommand).await;
                return Ok(ControlFlow::Continue(()));
            }
        };

        match command {
            Command::Say(text) => match &active.room {
                Some(room) => {
                    let line = ServerMessage::chat(room, &active.name, &text).render();
                    self.context.registry.broadcast(room.clone(), line);
                }
                None => self.reply(ServerMessage::JoinRoomFirst).await,
            },
            Command::List => {
                let names = self.context.registry.list_names().await;
                self.reply(ServerMessage::UserList { names }).await;
            }
            Command::Msg { to, text } => {
                match self
                    .context
                    .registry
                    .direct_message(self.id, to.as_str(), text.as_str())
                    .await
                {
                    Ok(()) => {
                        self.reply(ServerMessage::PrivateTo { name: to, text }).await;
                    }
                    Err(RegistryError::UserNotFound(name)) => {
                        self.reply(ServerMessage::UserNotFound { name }).await;
                    }
                    Err(e) => return Err(ConnectionError::Registry(e)),
                }
            }
            Command::Join(room) => {
                self.context
                    .registry
                    .join(self.id, room.clone())
                    .await
                    .map_err(ConnectionError::Registry)?;
                active.room = Some(room.clone());
                self.reply(ServerMessage::JoinedRoom { room }).await;
            }
            Command::Quit => {
                self.reply(ServerMessage::Goodbye).await;
                return Ok(ControlFlow::Break(()));
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    /// Queues a reply to this session.
    async fn reply(&self, message: ServerMessage) {
        let delivery = self.outbox.send(message.render()).await;
        if !delivery.is_queued() {
            debug!(connection = %self.id, delivery = ?delivery, "Reply dropped");
        }
    }

    /// Reads one line during the handshake, where over-long input is fatal.
    async fn read_text(&mut self) -> Result<String, ConnectionError> {
        match self.read_line().await? {
            Line::Text(text) => Ok(text),
            Line::TooLong => Err(ConnectionError::LineTooLong {
                max: self.context.settings.max_line_length,
            }),
        }
    }

    /// Reads a single newline-terminated line.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected. A
    /// trailing fragment without a newline before end-of-stream is discarded.
    async fn read_line(&mut self) -> Result<Line, ConnectionError> {
        let max = self.context.settings.max_line_length;
        // Room for "\r\n" on top of the payload
        let limit = max as u64 + 2;
        let mut buf = Vec::new();

        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if read == 0 {
            return Err(ConnectionError::Eof);
        }

        if buf.ends_with(b"\n") {
            let decoded = String::from_utf8_lossy(&buf);
            let text = strip_line_ending(&decoded);
            if text.len() > max {
                return Ok(Line::TooLong);
            }
            return Ok(Line::Text(text.to_string()));
        }

        if (read as u64) < limit {
            // Stream ended mid-line
            return Err(ConnectionError::Eof);
        }

        self.discard_rest_of_line().await?;
        Ok(Line::TooLong)
    }

    /// Skips input up to and including the next newline.
    async fn discard_rest_of_line(&mut self) -> Result<(), ConnectionError> {
        loop {
            let (consumed, found) = {
                let available = self
                    .reader
                    .fill_buf()
                    .await
                    .map_err(|e| ConnectionError::Io(e.to_string()))?;
                if available.is_empty() {
                    return Err(ConnectionError::Eof);
                }
                match available.iter().position(|&b| b == b'\n') {
                    Some(pos) => (pos + 1, true),
                    None => (available.len(), false),
                }
            };

            self.reader.consume(consumed);
            if found {
                return Ok(());
            }
        }
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Connection cancelled")]
    Cancelled,

    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoticeScope;
    use crate::registry::spawn_dispatcher;
    use roomchat_core::{MemoryCredentialStore, OutboxReceiver};
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio::time::{timeout, Duration};

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        input: DuplexStream,
        output: OutboxReceiver,
        task: JoinHandle<ConnectionState>,
        token: CancellationToken,
    }

    fn spawn_handler(registry: RegistryHandle, settings: SessionSettings) -> Harness {
        let (input, reader) = tokio::io::duplex(8192);
        let (outbox, output) = Outbox::channel(64);
        let token = CancellationToken::new();
        let context = ConnectionContext {
            registry,
            credentials: Arc::new(MemoryCredentialStore::new()),
            settings: Arc::new(settings),
        };
        let handler = SessionHandler::new(
            ConnectionId::new(1),
            reader,
            outbox,
            context,
            token.clone(),
        );
        Harness {
            input,
            output,
            task: tokio::spawn(handler.run()),
            token,
        }
    }

    async fn next(output: &mut OutboxReceiver) -> String {
        timeout(WAIT, output.recv())
            .await
            .expect("reply in time")
            .expect("outbox open")
    }

    async fn login(harness: &mut Harness) {
        harness.input.write_all(b"alice\npw\n").await.unwrap();
        assert_eq!(next(&mut harness.output).await, "Enter your username: ");
        assert_eq!(next(&mut harness.output).await, "Enter your password: ");
        assert_eq!(
            next(&mut harness.output).await,
            "Registration successful. You are now authenticated.\n"
        );
        assert_eq!(next(&mut harness.output).await, "alice joined the chat\n");
    }

    #[tokio::test]
    async fn test_invalid_username_closes() {
        let registry = spawn_dispatcher(NoticeScope::Room);
        let mut harness = spawn_handler(registry.clone(), SessionSettings::default());

        harness.input.write_all(b"  \npw\n").await.unwrap();
        next(&mut harness.output).await;
        next(&mut harness.output).await;
        assert_eq!(next(&mut harness.output).await, "Invalid username.\n");

        let state = timeout(WAIT, harness.task).await.unwrap().unwrap();
        assert_eq!(state, ConnectionState::Closed);
        assert!(registry.list_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_commands_and_quit() {
        let registry = spawn_dispatcher(NoticeScope::Room);
        let mut harness = spawn_handler(registry.clone(), SessionSettings::default());
        login(&mut harness).await;

        harness.input.write_all(b"hello\n").await.unwrap();
        assert_eq!(
            next(&mut harness.output).await,
            "Join a room to start chatting. Use /join <room> to join a room.\n"
        );

        harness.input.write_all(b"/join lobby\n").await.unwrap();
        assert_eq!(next(&mut harness.output).await, "Joined room lobby\n");

        harness.input.write_all(b"hello\n").await.unwrap();
        assert_eq!(next(&mut harness.output).await, "[lobby] alice: hello\n");

        harness.input.write_all(b"\n").await.unwrap();
        assert_eq!(next(&mut harness.output).await, "[lobby] alice: \n");

        harness.input.write_all(b"/list\n").await.unwrap();
        assert_eq!(next(&mut harness.output).await, "alice\n");

        harness.input.write_all(b"/msg\n").await.unwrap();
        assert_eq!(
            next(&mut harness.output).await,
            "Usage: /msg <user> <message>\n"
        );

        harness.input.write_all(b"/msg nobody hi\n").await.unwrap();
        assert_eq!(next(&mut harness.output).await, "User nobody not found\n");

        harness.input.write_all(b"/wave\n").await.unwrap();
        assert_eq!(next(&mut harness.output).await, "Unknown command\n");

        harness.input.write_all(b"/quit\n").await.unwrap();
        assert_eq!(next(&mut harness.output).await, "Goodbye.\n");

        let state = timeout(WAIT, harness.task).await.unwrap().unwrap();
        assert_eq!(state, ConnectionState::Closed);
        assert!(registry.list_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_long_line_is_rejected_and_skipped() {
        let registry = spawn_dispatcher(NoticeScope::Room);
        let settings = SessionSettings {
            max_line_length: 8,
            ..SessionSettings::default()
        };
        let mut harness = spawn_handler(registry, settings);
        login(&mut harness).await;

        harness
            .input
            .write_all(b"/join this-line-is-far-too-long\n/list\n")
            .await
            .unwrap();
        assert_eq!(
            next(&mut harness.output).await,
            "Message too long (max 8 bytes)\n"
        );
        // The rest of the long line was discarded; the next line still works
        assert_eq!(next(&mut harness.output).await, "alice\n");
    }

    #[tokio::test]
    async fn test_partial_line_at_eof_is_discarded() {
        let registry = spawn_dispatcher(NoticeScope::Room);
        let mut harness = spawn_handler(registry.clone(), SessionSettings::default());
        login(&mut harness).await;

        harness.input.write_all(b"/join lobby").await.unwrap();
        drop(harness.input);

        let state = timeout(WAIT, harness.task).await.unwrap().unwrap();
        assert_eq!(state, ConnectionState::Closed);
        assert!(registry.list_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_ends_active_session() {
        let registry = spawn_dispatcher(NoticeScope::Room);
        let mut harness = spawn_handler(registry.clone(), SessionSettings::default());
        login(&mut harness).await;

        harness.token.cancel();

        let state = timeout(WAIT, harness.task).await.unwrap().unwrap();
        assert_eq!(state, ConnectionState::Closed);
        assert!(registry.list_names().await.is_empty());
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config {
            default_room: Some("lobby".to_string()),
            max_line_length: 100,
            ..Config::default()
        };
        let settings = SessionSettings::from_config(&config);
        assert_eq!(settings.default_room.map(String::from).as_deref(), Some("lobby"));
        assert_eq!(settings.max_line_length, 100);
        assert_eq!(settings.write_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::LineTooLong { max: 4096 };
        assert!(err.to_string().contains("4096"));
        let err = ConnectionError::from(RegistryError::ChannelClosed);
        assert_eq!(err.to_string(), "Registry error: dispatcher channel closed");
    }
}
