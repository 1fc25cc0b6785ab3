//! Read-only status reporter.
//!
//! Each connection to the status listener receives one plain-text snapshot
//! of the registry and is then closed:
//!
//! ```text
//! Connected clients: 2
//! User: alice, Room: lobby
//! User: bob, Room:
//! ```

use std::fmt::Write as _;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{RegistryHandle, RegistrySnapshot};

/// Renders a snapshot in the status text format.
pub fn render_status(snapshot: &RegistrySnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Connected clients: {}", snapshot.session_count());
    for session in &snapshot.sessions {
        let _ = writeln!(out, "User: {}, Room: {}", session.name, session.room_label());
    }
    out
}

/// Serves registry snapshots on a dedicated listener.
pub struct StatusReporter {
    listener: TcpListener,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
}

impl StatusReporter {
    pub fn new(
        listener: TcpListener,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            listener,
            registry,
            cancel_token,
        }
    }

    /// Accepts status requests until cancelled.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(addr = %addr, "Status reporter listening");
        }

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Status reporter shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((mut stream, peer)) => {
                            let report = render_status(&self.registry.snapshot().await);
                            if let Err(e) = stream.write_all(report.as_bytes()).await {
                                debug!(peer = %peer, error = %e, "Failed to send status");
                            }
                            let _ = stream.shutdown().await;
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to accept status connection");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use roomchat_core::{ConnectionId, RoomName, Session, SessionView};

    fn view(id: u64, name: &str, room: Option<&str>) -> SessionView {
        let room = room.and_then(|r| RoomName::new(r).ok());
        Session::authenticated(ConnectionId::new(id), name)
            .with_room(room)
            .view()
    }

    #[test]
    fn test_render_empty() {
        let snapshot = RegistrySnapshot::default();
        assert_eq!(render_status(&snapshot), "Connected clients: 0\n");
    }

    #[test]
    fn test_render_sessions() {
        let snapshot = RegistrySnapshot {
            sessions: vec![view(1, "alice", Some("lobby")), view(2, "bob", None)],
        };
        assert_eq!(
            render_status(&snapshot),
            "Connected clients: 2\nUser: alice, Room: lobby\nUser: bob, Room: \n"
        );
    }

    #[test]
    fn test_view_has_connect_time() {
        let before = Utc::now();
        let v = view(3, "carol", None);
        assert!(v.connected_at >= before);
    }
}
