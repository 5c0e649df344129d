//! WebSocket transport with bounded reconnection.
//!
//! A [`Transport`] owns at most one live socket. [`Transport::open`] spawns a
//! tokio task that connects, pumps frames in both directions and, when the
//! socket drops for any reason other than [`Transport::close`], retries at a
//! fixed interval until the [`ReconnectPolicy`] budget is spent.
//!
//! # Socket Task
//!
//! ```text
//!            open()
//!              │
//!              ▼
//!   ┌──── Connecting ─────┐
//!   │ ok            fail  │
//!   ▼                     ▼
//! Connected ──drop──► Reconnecting{n} ──n > max──► Failed
//!   ▲                     │
//!   └──────── ok ─────────┘
//! ```
//!
//! Reconnection walks the candidate list starting from the address that
//! last accepted a connection: a lost socket is first retried at the same
//! address, and each failed attempt moves on to the next candidate.
//!
//! Every live socket gets a new epoch. [`Transport::send`] returns the
//! epoch the frame was queued on and the connected/disconnected events
//! carry it, so a consumer can tell which socket a notice refers to.
//!
//! Everything the task observes is delivered in order on the [`Incoming`]
//! stream returned by `open`. The stream ends with `None` after `close()`
//! and with `Err(ConnectionRefused)` once reconnection is exhausted.
//!
//! Outbound frames are never buffered while disconnected:
//! [`Transport::send`] fails with [`Error::NoConnection`] instead.

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{InboundFrame, Request};

use super::endpoint::{Endpoint, ReconnectPolicy};

// ============================================================================
// Types
// ============================================================================

/// Client side WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Items delivered on the incoming stream.
pub type IncomingItem = Result<TransportEvent>;

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Connectivity signal published by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No socket and nothing in progress.
    #[default]
    Disconnected,
    /// Initial connect in progress.
    Connecting,
    /// Socket is live.
    Connected,
    /// Waiting for, or running, reconnection attempt `attempt`.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Reconnection budget exhausted; reopen required.
    Failed,
}

impl ConnectionStatus {
    /// Returns `true` if a socket is live.
    #[inline]
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Something the socket task observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The first connect attempt of an `open()` is starting.
    Connecting {
        /// Address being tried.
        url: Url,
    },
    /// A socket was established.
    Connected {
        /// Address that accepted the connection.
        url: Url,
        /// Epoch of the new socket.
        epoch: u64,
    },
    /// The live socket was lost; reconnection follows.
    Disconnected {
        /// Why the socket closed.
        reason: String,
        /// Epoch of the lost socket.
        epoch: u64,
    },
    /// A reconnection attempt is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Attempt budget.
        max_attempts: u32,
    },
    /// A decoded inbound frame.
    Frame(InboundFrame),
    /// A text message that is not a valid frame. The socket stays open.
    Malformed {
        /// The raw text received.
        text: String,
        /// Decoding failure.
        message: String,
    },
}

// ============================================================================
// Incoming
// ============================================================================

/// Stream of everything received on one opened transport.
#[derive(Debug)]
pub struct Incoming {
    rx: mpsc::UnboundedReceiver<IncomingItem>,
}

impl Incoming {
    /// Receives the next item; `None` once the transport is closed.
    pub async fn next(&mut self) -> Option<IncomingItem> {
        self.rx.recv().await
    }
}

impl Stream for Incoming {
    type Item = IncomingItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// Link
// ============================================================================

/// State shared between the transport handle and its socket task.
///
/// Every mutation carries the generation of the task making it, so a task
/// that was superseded by `close()`/`open()` can no longer touch the link.
struct Link {
    state: Mutex<LinkState>,
    status_tx: watch::Sender<ConnectionStatus>,
}

#[derive(Default)]
struct LinkState {
    generation: u64,
    epoch: u64,
    writer: Option<mpsc::UnboundedSender<Message>>,
    failed_after: Option<u32>,
}

impl Link {
    fn new() -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            state: Mutex::new(LinkState::default()),
            status_tx,
        }
    }

    /// Invalidates the current task and returns the next generation.
    fn reset(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.writer = None;
        state.failed_after = None;
        self.publish(ConnectionStatus::Disconnected);
        state.generation
    }

    /// Publishes a status if `generation` is still current.
    fn set_status(&self, generation: u64, status: ConnectionStatus) -> bool {
        let state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        self.publish(status);
        true
    }

    /// Installs the writer of a fresh socket and returns its epoch.
    ///
    /// Epochs keep increasing across `open()` calls.
    fn attach(&self, generation: u64, writer: mpsc::UnboundedSender<Message>) -> Option<u64> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }
        state.epoch += 1;
        state.writer = Some(writer);
        self.publish(ConnectionStatus::Connected);
        Some(state.epoch)
    }

    /// Removes the writer of a lost socket.
    fn detach(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.writer = None;
            self.publish(ConnectionStatus::Disconnected);
        }
    }

    /// Marks the transport as permanently failed.
    fn fail(&self, generation: u64, attempts: u32) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.writer = None;
            state.failed_after = Some(attempts);
            self.publish(ConnectionStatus::Failed);
        }
    }

    fn publish(&self, status: ConnectionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

// ============================================================================
// Session
// ============================================================================

/// Handle on the socket task of one `open()`.
struct Session {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

// ============================================================================
// Transport
// ============================================================================

/// Resilient WebSocket transport to the middleware.
///
/// # Example
///
/// ```ignore
/// let transport = Transport::new(ReconnectPolicy::default());
/// let mut incoming = transport.open(Endpoint::parse("ws://127.0.0.1:4044")?);
///
/// while let Some(item) = incoming.next().await {
///     println!("{:?}", item?);
/// }
/// ```
pub struct Transport {
    policy: ReconnectPolicy,
    link: Arc<Link>,
    session: Mutex<Option<Session>>,
}

impl Transport {
    /// Creates a closed transport.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            link: Arc::new(Link::new()),
            session: Mutex::new(None),
        }
    }

    /// Returns the reconnection policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Opens the transport against the endpoint's first candidate.
    ///
    /// Any existing connection is torn down first. Must be called from
    /// within a tokio runtime.
    pub fn open(&self, endpoint: Endpoint) -> Incoming {
        self.close();

        let generation = self.link.state.lock().generation;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        debug!(url = %endpoint.primary(), generation, "Opening transport");

        let task = tokio::spawn(run_socket_loop(SocketLoop {
            endpoint,
            policy: self.policy,
            link: Arc::clone(&self.link),
            generation,
            events_tx,
            shutdown_rx,
        }));

        *self.session.lock() = Some(Session { shutdown_tx, task });

        Incoming { rx: events_rx }
    }

    /// Enqueues a request on the live socket.
    ///
    /// Returns the epoch of the socket the frame was queued on.
    ///
    /// # Errors
    ///
    /// - [`Error::NoConnection`] if no socket is live
    /// - [`Error::ConnectionRefused`] if reconnection was exhausted
    /// - [`Error::Json`] if the request cannot be serialized
    pub fn send(&self, request: &Request) -> Result<u64> {
        let json = request.to_json()?;
        let epoch = self.send_text(json)?;
        trace!(call_id = %request.id, method = %request.method, epoch, "Frame enqueued");
        Ok(epoch)
    }

    /// Enqueues a raw text frame on the live socket.
    ///
    /// # Errors
    ///
    /// Same as [`Transport::send`].
    pub fn send_text(&self, text: String) -> Result<u64> {
        let state = self.link.state.lock();

        match (&state.writer, state.failed_after) {
            (Some(writer), _) => writer
                .send(Message::Text(text.into()))
                .map(|()| state.epoch)
                .map_err(|_| Error::NoConnection),
            (None, Some(attempts)) => Err(Error::connection_refused(attempts)),
            (None, None) => Err(Error::NoConnection),
        }
    }

    /// Closes the connection and cancels reconnection.
    ///
    /// Safe to call repeatedly.
    pub fn close(&self) {
        self.link.reset();

        if let Some(session) = self.session.lock().take() {
            // The task may already have exited; a closed channel is fine.
            let _ = session.shutdown_tx.send(());
            debug!(finished = session.task.is_finished(), "Transport closed");
        }
    }

    /// Returns the current connectivity status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.link.status_tx.borrow()
    }

    /// Subscribes to connectivity transitions.
    #[inline]
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.link.status_tx.subscribe()
    }

    /// Returns `true` if a socket is live.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.state.lock().writer.is_some()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            let _ = session.shutdown_tx.send(());
        }
    }
}

// ============================================================================
// Socket Loop
// ============================================================================

/// Everything the socket task owns.
struct SocketLoop {
    endpoint: Endpoint,
    policy: ReconnectPolicy,
    link: Arc<Link>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<IncomingItem>,
    shutdown_rx: oneshot::Receiver<()>,
}

/// Why a live socket stopped being pumped.
enum PumpExit {
    /// `close()`, `open()` or the consumer went away.
    Shutdown,
    /// The socket closed or failed on its own.
    Lost(String),
}

/// Connects, pumps and reconnects until closed or out of attempts.
async fn run_socket_loop(ctx: SocketLoop) {
    let SocketLoop {
        endpoint,
        policy,
        link,
        generation,
        events_tx,
        mut shutdown_rx,
    } = ctx;

    // Attempts since the last live socket; `cursor` is the candidate to try.
    let mut attempt: u32 = 0;
    let mut cursor: usize = 0;

    if !link.set_status(generation, ConnectionStatus::Connecting) {
        return;
    }
    let _ = events_tx.send(Ok(TransportEvent::Connecting {
        url: endpoint.primary().clone(),
    }));

    loop {
        let url = endpoint.candidate(cursor).clone();

        let connected = tokio::select! {
            biased;
            _ = &mut shutdown_rx => return,
            result = timeout(policy.connect_timeout, connect_async(url.as_str())) => result,
        };

        match connected {
            Ok(Ok((ws_stream, _response))) => {
                let (writer_tx, writer_rx) = mpsc::unbounded_channel();
                let Some(epoch) = link.attach(generation, writer_tx) else {
                    return;
                };

                attempt = 0;
                info!(url = %url, epoch, "Connected to middleware");
                let _ = events_tx.send(Ok(TransportEvent::Connected {
                    url: url.clone(),
                    epoch,
                }));

                match pump(ws_stream, writer_rx, &events_tx, &mut shutdown_rx).await {
                    PumpExit::Shutdown => {
                        debug!(url = %url, "Socket task shut down");
                        return;
                    }
                    PumpExit::Lost(reason) => {
                        link.detach(generation);
                        warn!(url = %url, reason = %reason, epoch, "Connection lost");
                        let _ = events_tx.send(Ok(TransportEvent::Disconnected { reason, epoch }));
                    }
                }
            }
            Ok(Err(e)) => {
                debug!(url = %url, error = %e, attempt, "Connect attempt failed");
                cursor = cursor.wrapping_add(1);
            }
            Err(_) => {
                debug!(
                    url = %url,
                    timeout_ms = policy.connect_timeout.as_millis() as u64,
                    attempt,
                    "Connect attempt timed out"
                );
                cursor = cursor.wrapping_add(1);
            }
        }

        if attempt >= policy.max_attempts {
            error!(
                attempts = attempt,
                max = policy.max_attempts,
                "Reconnection attempts exhausted"
            );
            link.fail(generation, attempt);
            let _ = events_tx.send(Err(Error::connection_refused(attempt)));
            return;
        }

        attempt += 1;
        if !link.set_status(generation, ConnectionStatus::Reconnecting { attempt }) {
            return;
        }

        debug!(
            attempt,
            delay_ms = policy.interval.as_millis() as u64,
            "Waiting before reconnection"
        );
        let _ = events_tx.send(Ok(TransportEvent::Reconnecting {
            attempt,
            max_attempts: policy.max_attempts,
        }));

        tokio::select! {
            biased;
            _ = &mut shutdown_rx => return,
            _ = sleep(policy.interval) => {}
        }
    }
}

/// Moves frames between one live socket and the transport.
async fn pump(
    ws_stream: WsStream,
    mut writer_rx: mpsc::UnboundedReceiver<Message>,
    events_tx: &mpsc::UnboundedSender<IncomingItem>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> PumpExit {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            _ = &mut *shutdown_rx => {
                let _ = ws_write.close().await;
                return PumpExit::Shutdown;
            }

            // Outgoing frames from `send`
            outgoing = writer_rx.recv() => {
                match outgoing {
                    Some(message) => {
                        if let Err(e) = ws_write.send(message).await {
                            return PumpExit::Lost(e.to_string());
                        }
                    }
                    None => {
                        let _ = ws_write.close().await;
                        return PumpExit::Shutdown;
                    }
                }
            }

            // Incoming messages from the middleware
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let text = text.as_str();
                        let item = match InboundFrame::parse(text) {
                            Ok(frame) => TransportEvent::Frame(frame),
                            Err(e) => {
                                warn!(text = %text, error = %e, "Dropping malformed frame");
                                TransportEvent::Malformed {
                                    text: text.to_owned(),
                                    message: e.to_string(),
                                }
                            }
                        };

                        if events_tx.send(Ok(item)).is_err() {
                            let _ = ws_write.close().await;
                            return PumpExit::Shutdown;
                        }
                    }

                    Some(Ok(Message::Close(_))) => {
                        return PumpExit::Lost("closed by remote".to_string());
                    }

                    Some(Err(e)) => {
                        return PumpExit::Lost(e.to_string());
                    }

                    None => {
                        return PumpExit::Lost("stream ended".to_string());
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
