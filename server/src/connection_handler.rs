//! The loop every websocket runs in.
//!
//! [`handle_connection_socket`] reads a frame, lets the [`Relay`] handle it
//! to completion, then reads the next one. Frames other connections queue
//! for this one are written out by a separate writer task, so a peer that
//! stops reading never holds up the read loop or shutdown. The loop ends
//! when the peer goes away, the server shuts down, the writer gives up or,
//! if configured, nothing happened for too long. The member bound to the
//! connection is removed on the way out.

use std::{sync::Arc, time::Duration};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::{sync::Notify, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{event, Instrument, Level};

use crate::{
    connection::{ConnectionHandle, OutgoingFrame, OutgoingQueue},
    relay::Relay,
};

/// How long a single frame may take to reach the socket.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long closing the socket may take once the connection is done.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// What the supervisor needs to know about an inbound websocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Only the length is kept, binary frames are not part of the protocol.
    Binary(usize),
    /// Ping or pong.
    Heartbeat,
    Close,
}

async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

async fn close_socket<S: Sink<OutgoingFrame> + Unpin>(sender: &mut S) {
    if timeout(CLOSE_TIMEOUT, sender.close()).await.is_err() {
        event!(Level::DEBUG, "Gave up closing the socket");
    }
}

/// Drains `outgoing` into the socket until the connection is closed.
/// Closes the handle itself when a write fails or times out.
async fn write_frames<S>(
    mut sender: S,
    mut outgoing: OutgoingQueue,
    handle: ConnectionHandle,
    activity: Arc<Notify>,
) where
    S: Sink<OutgoingFrame> + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;

            () = handle.closed() => break,
            frame = outgoing.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        tokio::select! {
            biased;

            () = handle.closed() => break,
            written = timeout(WRITE_TIMEOUT, sender.send(frame)) => match written {
                Ok(Ok(())) => activity.notify_one(),
                Ok(Err(_)) => {
                    event!(Level::DEBUG, "Could not write to socket");
                    break;
                }
                Err(_) => {
                    event!(Level::DEBUG, "Write timed out, peer is not reading");
                    break;
                }
            },
        }
    }

    handle.close();
    outgoing.close();
    close_socket(&mut sender).await;
}

pub async fn handle_connection_socket<Socket>(
    socket: Socket,
    relay: Arc<Relay>,
    shutdown: CancellationToken,
    idle_timeout: Option<Duration>,
) where
    Socket: Stream<Item = Result<Frame, ()>> + Sink<OutgoingFrame> + Send + 'static,
    <Socket as Sink<OutgoingFrame>>::Error: Send,
{
    let (mut sender, mut receiver) = socket.split();
    let (handle, outgoing) = ConnectionHandle::open();

    if let Err(err) = relay.registry().attach(handle.clone()) {
        event!(Level::DEBUG, "Refusing connection: {err}");
        close_socket(&mut sender).await;
        return;
    }

    let span = tracing::Span::current();
    span.record("connection", tracing::field::display(handle.id()));

    let activity = Arc::new(Notify::new());
    let writer = tokio::spawn(
        write_frames(sender, outgoing, handle.clone(), activity.clone()).instrument(span),
    );

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                event!(Level::DEBUG, "Server shutting down");
                break;
            },
            () = handle.closed() => {
                event!(Level::DEBUG, "Connection can no longer be written to");
                break;
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Frame::Text(text))) => relay.handle_frame(&text, &handle),
                Some(Ok(Frame::Binary(len))) => {
                    event!(Level::WARN, len, "Ignoring binary frame");
                }
                Some(Ok(Frame::Heartbeat)) => {}
                Some(Ok(Frame::Close)) | None => {
                    event!(Level::DEBUG, "Connection closed by peer");
                    break;
                }
                Some(Err(())) => {
                    event!(Level::DEBUG, "Could not read from socket");
                    break;
                }
            },
            // a frame went out, that counts as activity
            () = activity.notified() => {},
            () = idle(idle_timeout) => {
                event!(Level::DEBUG, "Connection timed out");
                break;
            },
        }
    }

    // from here on the registry sees the connection as closed
    handle.close();

    if let Some(member) = relay.registry().detach(handle.id()) {
        event!(Level::INFO, member = %member, "Member left");
    }

    // bounded by CLOSE_TIMEOUT
    if writer.await.is_err() {
        event!(Level::WARN, "Writer task failed");
    }
}
