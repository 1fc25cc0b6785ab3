//! TCP chat server for the roomchat daemon.
//!
//! The server:
//! - Listens on a TCP socket for chat clients
//! - Spawns a writer task and a SessionHandler for each client
//! - Optionally serves registry snapshots on a status listener
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ├──────────────────────────┐
//!         ▼                          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ SessionHandler  │     │   writer task   │
//! │  (read half)    │     │  (write half)   │
//! └───────┬─────────┘     └────────▲────────┘
//!         │ RegistryEvent          │ Outbox
//!         ▼                        │
//! ┌─────────────────┐              │
//! │   Dispatcher    │──────────────┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the loop keeps accepting

mod connection;
mod status;
mod writer;

pub use connection::{
    ConnectionContext, ConnectionError, ConnectionState, SessionHandler, SessionSettings,
};
pub use status::{render_status, StatusReporter};
pub use writer::{run_writer, WriterExit};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use roomchat_core::{ConnectionId, CredentialStore, Outbox};

use crate::config::Config;
use crate::registry::RegistryHandle;

/// How long shutdown waits for connection tasks to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// TCP chat server.
pub struct ChatServer {
    /// Chat listener
    listener: TcpListener,

    /// Status listener, when enabled
    status: Option<TcpListener>,

    /// Shared services handed to each session handler
    context: ConnectionContext,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Parent of every connection's token; cancelled once the registry has
    /// been discarded
    connections: CancellationToken,

    /// Connection counter for generating connection ids
    connection_counter: AtomicU64,

    /// Handler and writer tasks still running
    tasks: TaskTracker,
}

impl ChatServer {
    /// Binds the chat listener, and the status listener if configured.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated daemon configuration
    /// * `registry` - Handle to the dispatcher
    /// * `credentials` - Credential store shared by all sessions
    /// * `cancel_token` - Token for graceful shutdown
    pub async fn bind(
        config: &Config,
        registry: RegistryHandle,
        credentials: Arc<dyn CredentialStore>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = bind_listener(config.listen_addr).await?;
        let status = match config.status_addr {
            Some(addr) => Some(bind_listener(addr).await?),
            None => None,
        };

        let context = ConnectionContext {
            registry,
            credentials,
            settings: Arc::new(SessionSettings::from_config(config)),
        };

        Ok(Self {
            listener,
            status,
            context,
            cancel_token,
            connections: CancellationToken::new(),
            connection_counter: AtomicU64::new(1),
            tasks: TaskTracker::new(),
        })
    }

    /// Returns the bound chat address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(|e| ServerError::Io(e.to_string()))
    }

    /// Returns the bound status address, if the reporter is enabled.
    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.status.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// tells every session the server is going away and waits briefly for
    /// connection tasks to finish.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Chat server listening");

        if let Some(listener) = self.status.take() {
            let reporter = StatusReporter::new(
                listener,
                self.context.registry.clone(),
                self.cancel_token.clone(),
            );
            self.tasks.spawn(reporter.run());
        }

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let id = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, ConnectionId::new(id));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Spawns the writer and handler tasks for a new connection.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, id: ConnectionId) {
        debug!(connection = %id, peer = %peer, "Accepted connection");

        let (reader, writer) = stream.into_split();
        let settings = &self.context.settings;
        let (outbox, outbox_rx) = Outbox::channel(settings.outbox_capacity);
        let token = self.connections.child_token();

        self.tasks.spawn(run_writer(
            writer,
            outbox_rx,
            settings.write_timeout,
            id,
            token.clone(),
        ));

        let handler = SessionHandler::new(id, reader, outbox, self.context.clone(), token);
        self.tasks.spawn(handler.run());
    }

    /// Discards the registry, ends every session and waits for connection
    /// tasks.
    async fn shutdown(self) {
        // Sessions must stay registered until the shutdown notice is queued
        let closed = self.context.registry.shutdown().await;
        info!(closed, "Notified sessions of shutdown");
        self.connections.cancel();

        self.tasks.close();
        if timeout(SHUTDOWN_GRACE, self.tasks.wait()).await.is_err() {
            warn!(
                remaining = self.tasks.len(),
                "Connection tasks still running after grace period"
            );
        }

        info!("Server cleanup complete");
    }
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
        addr,
        error: e.to_string(),
    })
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("I/O error: {0}")]
    Io(String),
}
