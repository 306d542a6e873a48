//! The server side of one websocket.
//!
//! A [`ConnectionHandle`] is the only thing other tasks get to hold. Writing
//! to it queues a text frame, the supervisor of the connection (see
//! [`crate::connection_handler`]) is the one actually writing to the socket.
//!
//! The queue is bounded. A peer that stops reading fills it up, at which
//! point the connection counts as closed and its member gets pruned.

use std::fmt::Display;

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use crate::error::Error;

/// Opaque identifier given to each accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Encoded envelope waiting to be written to the socket.
pub type OutgoingFrame = String;

/// Receiving end of a connection's queue.
pub type OutgoingQueue = mpsc::Receiver<OutgoingFrame>;

/// Frames that may wait for a slow peer before it is dropped.
pub const OUTGOING_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<OutgoingFrame>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Creates the handle of a new connection together with the queue its
    /// supervisor drains.
    pub fn open() -> (Self, OutgoingQueue) {
        Self::with_capacity(OUTGOING_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, OutgoingQueue) {
        let (sender, receiver) = mpsc::channel(capacity);

        (
            Self {
                id: ConnectionId::generate(),
                sender,
                closed: CancellationToken::new(),
            },
            receiver,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// A connection stays open until its supervisor stops draining it or
    /// the queue overflows.
    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled() && !self.sender.is_closed()
    }

    /// Marks the connection closed for every holder of the handle.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Resolves once [`ConnectionHandle::close`] was called on any clone.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    pub fn send_frame(&self, frame: OutgoingFrame) -> Result<(), Error> {
        if self.closed.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }

        self.sender.try_send(frame).map_err(|err| {
            if let mpsc::error::TrySendError::Full(_) = err {
                tracing::warn!(connection = %self.id, "Outgoing queue full, closing connection");
                self.close();
            }

            Error::ConnectionClosed
        })
    }
}
