//! Connection writer task.
//!
//! Each connection's write half is owned by exactly one writer task, which
//! drains the session's outbox onto the socket. The task ends, and closes
//! the write half, once every `Outbox` clone is dropped and the queue is
//! empty, or as soon as a write fails.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use roomchat_core::{ConnectionId, OutboxReceiver};

/// Why a writer task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterExit {
    /// Every outbox was dropped and the queue was drained.
    Drained,
    /// A write returned an error.
    Failed,
    /// A write did not finish within the write timeout.
    TimedOut,
}

/// Drains `outbox` onto `writer` until the outbox closes or a write fails.
///
/// A failed or timed-out write cancels `connection_token`, so the session
/// handler stops reading and unregisters the session right away instead of
/// waiting for its own read to fail.
pub async fn run_writer<W>(
    mut writer: W,
    mut outbox: OutboxReceiver,
    write_timeout: Duration,
    connection: ConnectionId,
    connection_token: CancellationToken,
) -> WriterExit
where
    W: AsyncWrite + Unpin,
{
    let exit = loop {
        let Some(text) = outbox.recv().await else {
            break WriterExit::Drained;
        };

        match timeout(write_timeout, writer.write_all(text.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(connection = %connection, error = %e, "Write failed");
                break WriterExit::Failed;
            }
            Err(_) => {
                debug!(connection = %connection, "Write timed out");
                break WriterExit::TimedOut;
            }
        }
    };

    if exit != WriterExit::Drained {
        // Later offers report Closed instead of piling up
        outbox.close();
        connection_token.cancel();
    }

    let _ = timeout(write_timeout, writer.shutdown()).await;
    debug!(connection = %connection, exit = ?exit, "Writer stopped");
    exit
}
