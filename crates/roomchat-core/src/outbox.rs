//! Per-session outbound queue and the best-effort delivery contract.
//!
//! Every session owns one bounded queue. The connection's writer task is the
//! only consumer and the only code that touches the socket's write half, so
//! replies from the session's own handler and fan-out from the dispatcher
//! never interleave mid-line.
//!
//! Delivery is **at-most-once**: [`Outbox::offer`] never blocks and never
//! retries. A full or closed queue drops the text and says so in the returned
//! [`Delivery`]; nothing is reported back to whoever produced the text.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Result of offering text to an outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the writer task.
    Queued,
    /// Dropped: the recipient is not draining its queue fast enough.
    Full,
    /// Dropped: the recipient's writer task has stopped.
    Closed,
}

impl Delivery {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

/// Sending side of a session's outbound queue.
///
/// Cheap to clone: the session handler keeps one copy for its own replies and
/// the registry keeps another for fan-out. The connection closes once every
/// copy is dropped and the writer has drained the queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: mpsc::Sender<String>,
}

/// Receiving side of a session's outbound queue, owned by the writer task.
#[derive(Debug)]
pub struct OutboxReceiver {
    receiver: mpsc::Receiver<String>,
}

impl Outbox {
    /// Creates a queue holding at most `capacity` pending writes.
    pub fn channel(capacity: usize) -> (Outbox, OutboxReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Outbox { sender }, OutboxReceiver { receiver })
    }

    /// Offers text for delivery without waiting.
    pub fn offer(&self, text: impl Into<String>) -> Delivery {
        match self.sender.try_send(text.into()) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Queues text, waiting for room if the queue is full.
    ///
    /// Only the session's own handler uses this, for replies to its own
    /// commands; waiting here stalls nobody else. Returns
    /// [`Delivery::Closed`] if the writer task has stopped.
    pub async fn send(&self, text: impl Into<String>) -> Delivery {
        match self.sender.send(text.into()).await {
            Ok(()) => Delivery::Queued,
            Err(_) => Delivery::Closed,
        }
    }

    /// Returns true once the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl OutboxReceiver {
    /// Waits for the next pending write.
    ///
    /// Returns `None` once every [`Outbox`] clone is dropped and the queue is
    /// empty.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Takes the next pending write if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }

    /// Stops accepting writes; later offers report [`Delivery::Closed`].
    pub fn close(&mut self) {
        self.receiver.close();
    }
}
