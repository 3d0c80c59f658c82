//! Per-connection websocket sessions.
//!
//! A session is one upgraded websocket connection. Inbound frames are read by
//! a single task that validates and dispatches them; outbound frames go
//! through a shared [`OutboundQueue`] drained by a single writer task. The
//! writer task is the per-session strand: because it is the sole consumer,
//! frame writes, the tail flush and the close frame never interleave, no
//! matter how many runtime workers are active.
//!
//! # Outbound queue contract
//!
//! - FIFO of immutable frames; at most one write is in flight.
//! - Frames enqueued before the handshake completes are deferred and drained
//!   in enqueue order once it does.
//! - `close()` starts the closing procedure: everything queued behind the
//!   in-flight frame is discarded, an optional definitive last frame may be
//!   appended, and after the tail is flushed the websocket close frame goes
//!   out.
//! - Enqueues after the closing procedure has started are dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::{
    tungstenite::{error::ProtocolError, Error as WsError, Message},
    WebSocketStream,
};

use arena_proto::VerifyError;

use crate::{dispatcher, registry::Registry, sync};

/// Process-unique session identity.
pub type SessionId = u64;

/// What the writer task should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Job {
    /// Write this frame.
    Write(String),
    /// Send the websocket close frame and stop.
    Close,
    /// Nothing to do; wait for a notification.
    Wait,
}

/// Outbound frame queue for one session.
///
/// Pure state machine; the async writer task executes the returned [`Job`]s.
#[derive(Debug, Default)]
struct OutboundQueue {
    /// Queued frames. The head is the in-flight frame while `writing` holds.
    queue: VecDeque<String>,
    writing: bool,
    handshake_complete: bool,
    in_closing_procedure: bool,
    /// The close decision has been taken; nothing more goes out.
    closed: bool,
}

impl OutboundQueue {
    /// Enqueue a frame. Returns `false` when dropped by the closing
    /// procedure.
    fn enqueue(&mut self, frame: String) -> bool {
        if self.in_closing_procedure {
            return false;
        }
        self.queue.push_back(frame);
        true
    }

    /// Allow writes to start. Frames queued so far stay in enqueue order.
    fn complete_handshake(&mut self) {
        self.handshake_complete = true;
    }

    /// Start the closing procedure, optionally with a definitive last frame.
    ///
    /// Everything queued behind the in-flight frame is discarded. Repeated
    /// calls are no-ops.
    fn begin_close(&mut self, last_frame: Option<String>) {
        if self.in_closing_procedure {
            return;
        }
        self.in_closing_procedure = true;
        self.queue.truncate(usize::from(self.writing));
        if let Some(frame) = last_frame {
            self.queue.push_back(frame);
        }
    }

    /// Pick the next job. At most one write is ever handed out before
    /// [`complete_write`](Self::complete_write) is called.
    fn next_job(&mut self) -> Job {
        if self.writing || !self.handshake_complete || self.closed {
            return Job::Wait;
        }
        if let Some(frame) = self.queue.front() {
            self.writing = true;
            return Job::Write(frame.clone());
        }
        if self.in_closing_procedure {
            self.closed = true;
            return Job::Close;
        }
        Job::Wait
    }

    /// The in-flight write finished; pop it.
    fn complete_write(&mut self) {
        debug_assert!(self.writing, "completion without an in-flight write");
        self.writing = false;
        self.queue.pop_front();
    }
}

/// Outbound state shared between handle clones and the writer task.
#[derive(Debug, Default)]
struct OutboundShared {
    queue: Mutex<OutboundQueue>,
    notify: Notify,
}

/// Cheap-to-clone handle used by rooms and the registry to reach a session.
///
/// All methods are thread-safe enqueues; no I/O happens under the lock.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    /// Remote endpoint label, captured at accept time so it stays valid
    /// across close.
    peer: Arc<str>,
    outbound: Arc<OutboundShared>,
}

impl SessionHandle {
    /// A new handle for the session `id` connected from `remote_endpoint`.
    pub fn new(id: SessionId, remote_endpoint: &str) -> Self {
        Self { id, peer: Arc::from(remote_endpoint), outbound: Arc::default() }
    }

    /// Stable session identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The peer's address label.
    pub fn remote_endpoint(&self) -> &str {
        &self.peer
    }

    /// Enqueue a frame for delivery. Dropped once the closing procedure has
    /// started.
    pub fn write(&self, frame: String) {
        if sync::lock(&self.outbound.queue).enqueue(frame) {
            self.outbound.notify.notify_one();
        }
    }

    /// Graceful close: flush the in-flight frame, then the close frame.
    pub fn close(&self) {
        sync::lock(&self.outbound.queue).begin_close(None);
        self.outbound.notify.notify_one();
    }

    /// Enqueue `frame` as the definitive last frame, then close.
    pub fn close_with(&self, frame: String) {
        sync::lock(&self.outbound.queue).begin_close(Some(frame));
        self.outbound.notify.notify_one();
    }

    fn complete_handshake(&self) {
        sync::lock(&self.outbound.queue).complete_handshake();
        self.outbound.notify.notify_one();
    }

    /// Frames currently queued for delivery, in order.
    #[cfg(test)]
    pub(crate) fn pending_frames(&self) -> Vec<String> {
        sync::lock(&self.outbound.queue).queue.iter().cloned().collect()
    }
}

/// Drive one upgraded websocket connection to completion.
///
/// Registers the session, spawns the writer task, then loops reading frames
/// and dispatching them until the peer closes, the transport fails, or a
/// validation error forces a close. Unregistration is observed by the
/// registry exactly once, when this function returns.
pub(crate) async fn run(ws: WebSocketStream<TcpStream>, handle: SessionHandle, registry: &Registry) {
    let mut handler = registry.register(handle.clone());
    tracing::debug!(
        session = handle.id(),
        peer = handle.remote_endpoint(),
        "websocket session open"
    );

    let (sink, stream) = ws.split();
    handle.complete_handshake();
    let writer = tokio::spawn(write_loop(sink, Arc::clone(&handle.outbound)));

    read_loop(stream, &handle, &mut handler, registry).await;

    registry.unregister(handle.id());
    handle.close();
    let _ = writer.await;
    tracing::debug!(session = handle.id(), "websocket session closed");
}

async fn read_loop(
    mut stream: SplitStream<WebSocketStream<TcpStream>>,
    handle: &SessionHandle,
    handler: &mut dispatcher::Handler,
    registry: &Registry,
) {
    while let Some(incoming) = stream.next().await {
        match incoming {
            Ok(Message::Text(raw)) => {
                if !handle_frame(&raw, handle, handler, registry) {
                    break;
                }
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(raw) => {
                    if !handle_frame(&raw, handle, handler, registry) {
                        break;
                    }
                }
                Err(_) => {
                    handle.close_with(VerifyError::InvalidJson.to_frame());
                    break;
                }
            },
            Ok(Message::Close(_)) => {
                tracing::debug!(session = handle.id(), "peer sent close");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(error) => {
                report_read_error(handle, &error);
                if matches!(error, WsError::Capacity(_)) {
                    // Oversized frame: close without a response frame.
                    handle.close();
                }
                break;
            }
        }
    }
}

/// Returns `false` when the connection must stop reading.
fn handle_frame(
    raw: &str,
    handle: &SessionHandle,
    handler: &mut dispatcher::Handler,
    registry: &Registry,
) -> bool {
    match arena_proto::verify(raw) {
        Ok(message) => {
            dispatcher::dispatch(registry, handle, handler, message);
            true
        }
        Err(error) => {
            tracing::debug!(session = handle.id(), %error, "frame failed validation");
            handle.close_with(error.to_frame());
            false
        }
    }
}

fn report_read_error(handle: &SessionHandle, error: &WsError) {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            tracing::debug!(session = handle.id(), "end of stream");
        }
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            tracing::debug!(session = handle.id(), "peer dropped without close handshake");
        }
        WsError::Capacity(detail) => {
            tracing::warn!(session = handle.id(), %detail, "frame too large");
        }
        WsError::Io(io) => {
            tracing::debug!(session = handle.id(), error = %io, "transport error");
        }
        other => {
            tracing::error!(session = handle.id(), error = %other, "websocket read failed");
        }
    }
}

/// The per-session strand: sole consumer of the outbound queue.
async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    shared: Arc<OutboundShared>,
) {
    loop {
        let job = sync::lock(&shared.queue).next_job();
        match job {
            Job::Write(frame) => {
                let result = sink.send(Message::Text(frame)).await;
                sync::lock(&shared.queue).complete_write();
                if let Err(error) = result {
                    tracing::debug!(error = %error, "outbound write failed");
                    sync::lock(&shared.queue).begin_close(None);
                    break;
                }
            }
            Job::Close => {
                // Failures are swallowed; the descriptor closes regardless.
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            Job::Wait => shared.notify.notified().await,
        }
    }
}
