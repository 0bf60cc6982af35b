//! WebSocket transport over tokio-tungstenite.
//!
//! Each `ConnectionAction::Open` spawns one task that owns one physical
//! socket. The task reports everything it observes as [`DriverEvent`]s tagged
//! with its [`SocketId`], so events from a socket the manager has already
//! replaced are recognised as stale and ignored upstream.
//!
//! Outbound frames reach the task over a per-socket channel. Dropping the
//! [`SocketHandle`] or calling [`SocketHandle::close`] ends the task after a
//! close frame; client-initiated closes are not reported back.

use futures::{SinkExt, StreamExt};
use rendezvous_app::DriverEvent;
use rendezvous_core::{CloseEvent, SocketId, SocketUrl};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::{self, Message};

/// Close code reported when the connection ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket task has exited
    #[error("{0} is closed")]
    Closed(SocketId),

    /// WebSocket protocol or I/O failure
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

/// Handle to a spawned socket task.
#[derive(Debug)]
pub struct SocketHandle {
    socket: SocketId,
    outbound: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

impl SocketHandle {
    /// Socket this handle controls.
    pub fn socket(&self) -> SocketId {
        self.socket
    }

    /// Queue a text frame.
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound.send(Outgoing::Text(text)).map_err(|_| TransportError::Closed(self.socket))
    }

    /// Send a close frame and end the task.
    pub fn close(self) {
        if self.outbound.send(Outgoing::Close).is_err() {
            self.task.abort();
        }
    }
}

/// Dial `url` on a new task, reporting on `events`.
pub fn spawn_socket(
    socket: SocketId,
    url: SocketUrl,
    events: mpsc::UnboundedSender<DriverEvent>,
) -> SocketHandle {
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_socket(socket, url, events, outbound_rx));
    SocketHandle { socket, outbound, task }
}

async fn run_socket(
    socket: SocketId,
    url: SocketUrl,
    events: mpsc::UnboundedSender<DriverEvent>,
    outbound: mpsc::UnboundedReceiver<Outgoing>,
) {
    let stream = match tokio_tungstenite::connect_async(url.expose()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let reason = url.redact_in(&e.to_string());
            tracing::error!(%socket, error = %reason, "WebSocket handshake failed");
            let _ = events.send(DriverEvent::SocketOpenFailed { socket, reason });
            return;
        },
    };

    tracing::debug!(%socket, "WebSocket handshake complete");
    if events.send(DriverEvent::SocketOpened(socket)).is_err() {
        return;
    }

    match pump(socket, stream, &events, outbound).await {
        Ok(Some(close)) => {
            let _ = events.send(DriverEvent::SocketClosed { socket, close });
        },
        Ok(None) => tracing::debug!(%socket, "socket closed by client"),
        Err(e) => {
            tracing::warn!(%socket, error = %e, "socket failed");
            let _ = events.send(DriverEvent::SocketError { socket, reason: e.to_string() });
            let _ = events.send(DriverEvent::SocketClosed {
                socket,
                close: CloseEvent { code: Some(ABNORMAL_CLOSURE), reason: e.to_string() },
            });
        },
    }
}

/// Shuttle frames until either side closes. Returns the peer's close, or
/// `None` if the client closed.
async fn pump<S>(
    socket: SocketId,
    stream: S,
    events: &mpsc::UnboundedSender<DriverEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outgoing>,
) -> Result<Option<CloseEvent>, TransportError>
where
    S: futures::Stream<Item = Result<Message, tungstenite::Error>>
        + futures::Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(Outgoing::Text(text)) => write.send(Message::text(text)).await?,
                Some(Outgoing::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    let _ = write.close().await;
                    return Ok(None);
                },
            },

            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str().to_owned();
                    let _ = events.send(DriverEvent::SocketText { socket, text });
                },
                Some(Ok(Message::Close(frame))) => {
                    let _ = events.send(DriverEvent::SocketClosing(socket));
                    let close = frame.map_or_else(
                        || CloseEvent { code: None, reason: String::new() },
                        |f| CloseEvent {
                            code: Some(u16::from(f.code)),
                            reason: f.reason.as_str().to_owned(),
                        },
                    );
                    return Ok(Some(close));
                },
                Some(Ok(Message::Binary(bytes))) => {
                    tracing::warn!(%socket, len = bytes.len(), "dropping binary frame");
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Ok(Some(CloseEvent {
                        code: Some(ABNORMAL_CLOSURE),
                        reason: "connection reset".to_string(),
                    }));
                },
            },
        }
    }
}
