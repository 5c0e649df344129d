//! Correlation client.
//!
//! A [`Client`] turns the transport's raw frame stream into single-shot
//! calls. Each call gets a fresh [`CallId`], waits on a oneshot channel and
//! is completed by the dispatcher task when a reply with the same id
//! arrives. Frames whose id is not numeric are server pushes and go to the
//! event broadcast only.
//!
//! # Tasks
//!
//! ```text
//! caller ──call()──► Correlator ──send──► Transport ──► socket task
//!    ▲                   ▲                                  │
//!    │ oneshot           │ route                            │ Incoming
//!    └──────────── dispatcher task ◄────────────────────────┘
//!                        │
//!                        ├──► keep-alive task (per connection)
//!                        └──► broadcast<Event>
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CallId;
use crate::protocol::{Action, Event, FrameTarget, InboundFrame, Method, Params, Request};
use crate::transport::{ConnectionStatus, Endpoint, Incoming, Transport, TransportEvent};

use super::builder::ClientBuilder;
use super::options::ClientOptions;
use super::registry::PendingCalls;

// ============================================================================
// Constants
// ============================================================================

/// Events buffered per subscriber before the slowest one starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Bound on waiting for the dispatcher to drain after close.
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Correlator
// ============================================================================

/// State shared by the client handle, the dispatcher and keep-alive tasks.
struct Correlator {
    options: ClientOptions,
    endpoint: Endpoint,
    transport: Transport,
    pending: Mutex<PendingCalls>,
    events_tx: broadcast::Sender<Event>,
}

impl Correlator {
    fn emit(&self, event: Event) {
        // No subscribers is not an error.
        let _ = self.events_tx.send(event);
    }

    async fn call(&self, method: Method, params: Params) -> Result<String> {
        let (call_id, reply_rx) = self.pending.lock().register(method)?;
        let _guard = PendingGuard {
            pending: &self.pending,
            call_id,
        };

        let request = Request::new(call_id, method, params);
        let epoch = match self.transport.send(&request) {
            Ok(epoch) => epoch,
            Err(e) => {
                debug!(call_id = %call_id, method = %method, error = %e, "Call not sent");
                self.emit(
                    Event::new(Action::NoneAvailable)
                        .with_msg_id(call_id)
                        .with_message(e.to_string()),
                );
                return Err(e);
            }
        };

        if !self.pending.lock().bind(call_id, epoch) {
            debug!(call_id = %call_id, epoch, "Call sent on a socket that was already lost");
            return Err(Error::call_abandoned(call_id));
        }

        self.emit(Event::new(Action::Send).with_msg_id(call_id));

        let deadline = self.options.call_deadline();
        match timeout(deadline, reply_rx).await {
            Ok(Ok(ret_val)) => Ok(ret_val),
            Ok(Err(_)) => Err(Error::call_abandoned(call_id)),
            Err(_) => {
                let err = Error::call_timeout(call_id, method, deadline.as_millis() as u64);
                warn!(call_id = %call_id, method = %method, "Call timed out");
                self.emit(
                    Event::new(Action::Exception)
                        .with_msg_id(call_id)
                        .with_message(err.to_string()),
                );
                Err(err)
            }
        }
    }

    /// Routes one inbound frame to its pending call or to the event stream.
    fn route(&self, frame: InboundFrame) {
        let reply_to = match frame.target() {
            FrameTarget::Reply(call_id) => Some(call_id),
            FrameTarget::Push(_) => None,
        };

        let Some(reply_to) = reply_to else {
            let event = Event::push(frame);
            debug!(action = %event.action, "Push event received");
            self.emit(event);
            return;
        };

        let Some(call_id) = reply_to else {
            debug!(call_cmd_id = %frame.call_cmd_id, "Reply id is not a valid call id");
            self.emit(Event::new(Action::InvalidReply).with_payload(frame));
            return;
        };

        let call = self.pending.lock().take(call_id);
        match call {
            Some(call) => {
                trace!(
                    call_id = %call_id,
                    method = %call.method,
                    elapsed_ms = call.elapsed().as_millis() as u64,
                    "Reply routed"
                );
                let action = if call.complete(frame.ret_val.clone()) {
                    Action::Recv
                } else {
                    // Caller gave up between the lookup and completion.
                    Action::InvalidReply
                };
                self.emit(Event::new(action).with_msg_id(call_id).with_payload(frame));
            }
            None => {
                debug!(call_id = %call_id, "Reply matches no pending call");
                self.emit(
                    Event::new(Action::InvalidReply)
                        .with_msg_id(call_id)
                        .with_payload(frame),
                );
            }
        }
    }

    fn abandon_pending(&self, reason: &str) {
        let abandoned = self.pending.lock().abandon_all();
        if abandoned > 0 {
            warn!(abandoned, reason = %reason, "Abandoned pending calls");
        }
    }

    /// Abandons the calls sent on the lost socket `epoch` or earlier ones.
    fn abandon_socket(&self, epoch: u64, reason: &str) {
        let abandoned = self.pending.lock().abandon_epoch(epoch);
        if abandoned > 0 {
            warn!(abandoned, epoch, reason = %reason, "Abandoned calls of lost socket");
        }
    }

    async fn keep_alive_once(&self, bound: Duration) {
        match timeout(bound, self.call(Method::GetVersion, Params::None)).await {
            Ok(Ok(version)) => trace!(version = %version, "Keep-alive answered"),
            Ok(Err(e)) => debug!(error = %e, "Keep-alive failed"),
            Err(_) => debug!(bound_ms = bound.as_millis() as u64, "Keep-alive unanswered"),
        }
    }
}

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes a call's registry entry when its `call()` future finishes or is
/// dropped.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingCalls>,
    call_id: CallId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().take(self.call_id);
    }
}

// ============================================================================
// KeepAlive
// ============================================================================

/// Keep-alive task of one connection; aborted on drop.
struct KeepAlive {
    task: JoinHandle<()>,
}

impl KeepAlive {
    fn spawn(correlator: Arc<Correlator>) -> Self {
        let task = tokio::spawn(async move {
            match correlator.options.keep_alive() {
                None => {
                    let bound = correlator.options.call_deadline();
                    correlator.keep_alive_once(bound).await;
                }
                Some(period) => {
                    let mut ticker = interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        correlator.keep_alive_once(period).await;
                    }
                }
            }
        });

        Self { task }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Consumes one opened transport until it ends.
async fn run_dispatcher(correlator: Arc<Correlator>, mut incoming: Incoming) {
    let mut keep_alive: Option<KeepAlive> = None;

    while let Some(item) = incoming.next().await {
        match item {
            Ok(TransportEvent::Connecting { url }) => {
                correlator.emit(Event::new(Action::Connecting).with_message(url.as_str()));
            }

            Ok(TransportEvent::Connected { url, epoch }) => {
                debug!(epoch, "Socket attached");
                correlator.emit(Event::new(Action::Connected).with_message(url.as_str()));
                keep_alive = Some(KeepAlive::spawn(Arc::clone(&correlator)));
            }

            Ok(TransportEvent::Disconnected { reason, epoch }) => {
                keep_alive = None;
                correlator.abandon_socket(epoch, &reason);
                correlator.emit(Event::new(Action::Disconnected).with_message(reason));
            }

            Ok(TransportEvent::Reconnecting {
                attempt,
                max_attempts,
            }) => {
                correlator.emit(
                    Event::new(Action::Reconnecting)
                        .with_message(format!("attempt {attempt} of {max_attempts}")),
                );
            }

            Ok(TransportEvent::Frame(frame)) => correlator.route(frame),

            Ok(TransportEvent::Malformed { text, message }) => {
                correlator.emit(
                    Event::new(Action::InvalidFrame).with_message(format!("{message}: {text}")),
                );
            }

            Err(e) => {
                drop(keep_alive.take());
                correlator.abandon_pending(&e.to_string());
                correlator.emit(
                    Event::new(Action::SocketClosedWithException).with_message(e.to_string()),
                );
                return;
            }
        }
    }

    debug!("Transport stream ended");
    correlator.emit(Event::new(Action::SocketClosed));
}

// ============================================================================
// ClientInner
// ============================================================================

/// Owner of the dispatcher; tears everything down when the last handle drops.
struct ClientInner {
    correlator: Arc<Correlator>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(task) = self.dispatcher.get_mut().take() {
            task.abort();
        }
        self.correlator.transport.close();
    }
}

// ============================================================================
// Client
// ============================================================================

/// Call/response client for the signing middleware.
///
/// Cheap to clone; clones share the connection, the pending calls and the
/// event stream.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use xtx_client::{Client, Method};
///
/// # async fn example() -> xtx_client::Result<()> {
/// let client = Client::builder().port(4044).build()?;
/// client.connect().await;
/// client.wait_connected(Duration::from_secs(10)).await?;
///
/// let version = client.call(Method::GetVersion, ()).await?;
/// println!("middleware {version}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.correlator.endpoint.primary().as_str())
            .field("status", &self.status())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Constructor
// ============================================================================

impl Client {
    /// Creates a disconnected client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::Url`] if the options are
    /// invalid.
    pub fn new(options: ClientOptions) -> Result<Self> {
        options.validate()?;
        let endpoint = options.endpoint()?;
        let transport = Transport::new(options.reconnect_policy());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(ClientInner {
                correlator: Arc::new(Correlator {
                    options,
                    endpoint,
                    transport,
                    pending: Mutex::new(PendingCalls::new()),
                    events_tx,
                }),
                dispatcher: Mutex::new(None),
            }),
        })
    }

    /// Returns a builder with default options.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

// ============================================================================
// Client - Connection
// ============================================================================

impl Client {
    /// Opens the connection, replacing any existing one.
    ///
    /// Returns as soon as the socket task is running; use
    /// [`Client::wait_connected`] to wait for the socket. Must be called
    /// from within a tokio runtime.
    pub async fn connect(&self) {
        if self.teardown().await {
            self.inner.correlator.emit(Event::new(Action::Disconnected));
        }

        let correlator = &self.inner.correlator;
        let incoming = correlator.transport.open(correlator.endpoint.clone());
        let task = tokio::spawn(run_dispatcher(Arc::clone(correlator), incoming));
        *self.inner.dispatcher.lock() = Some(task);

        info!(url = %correlator.endpoint.primary(), "Client connecting");
    }

    /// Closes the connection and abandons every pending call.
    ///
    /// Emits exactly one `disconnected` event. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        self.teardown().await;
        self.inner.correlator.emit(Event::new(Action::Disconnected));
    }

    /// Waits until the socket is live.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionRefused`] if reconnection is exhausted first
    /// - [`Error::ConnectionTimeout`] if `deadline` elapses first
    pub async fn wait_connected(&self, deadline: Duration) -> Result<()> {
        let mut status = self.watch_status();
        let attempts = self.inner.correlator.options.reconnect_attempts;

        let wait = async {
            loop {
                let current = *status.borrow_and_update();
                match current {
                    ConnectionStatus::Connected => return Ok(()),
                    ConnectionStatus::Failed => return Err(Error::connection_refused(attempts)),
                    _ => {}
                }
                if status.changed().await.is_err() {
                    return Err(Error::NoConnection);
                }
            }
        };

        timeout(deadline, wait)
            .await
            .map_err(|_| Error::connection_timeout(deadline.as_millis() as u64))?
    }

    /// Stops the dispatcher and transport. Returns `true` if one was running.
    async fn teardown(&self) -> bool {
        let dispatcher = self.inner.dispatcher.lock().take();
        let correlator = &self.inner.correlator;
        correlator.transport.close();

        let was_running = match dispatcher {
            Some(mut task) => {
                // Closing ends the incoming stream; let the dispatcher drain.
                if timeout(DISPATCHER_DRAIN_TIMEOUT, &mut task).await.is_err() {
                    warn!("Dispatcher did not stop in time; aborting");
                    task.abort();
                }
                true
            }
            None => false,
        };

        correlator.abandon_pending("client disconnected");
        was_running
    }
}

// ============================================================================
// Client - Calls
// ============================================================================

impl Client {
    /// Calls a middleware function and returns the reply's `retVal`.
    ///
    /// A list of params fills `param_1..param_N`, a scalar fills `param_1`
    /// and `()` sends none.
    ///
    /// # Errors
    ///
    /// - [`Error::NoConnection`] if no socket is live; nothing is queued
    /// - [`Error::ConnectionRefused`] if reconnection was exhausted
    /// - [`Error::CallTimeout`] if no reply arrives within the call timeout
    /// - [`Error::CallAbandoned`] if the connection dropped first
    /// - [`Error::DuplicateCallId`] if the id is still outstanding
    pub async fn call(&self, method: Method, params: impl Into<Params>) -> Result<String> {
        self.inner.correlator.call(method, params.into()).await
    }

    /// Emits an event on the shared stream.
    pub(crate) fn emit(&self, event: Event) {
        self.inner.correlator.emit(event);
    }
}

// ============================================================================
// Client - Accessors
// ============================================================================

impl Client {
    /// Subscribes to the event stream. Past events are not replayed.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.correlator.events_tx.subscribe()
    }

    /// Returns the connectivity status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.correlator.transport.status()
    }

    /// Subscribes to connectivity transitions.
    #[inline]
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.correlator.transport.watch_status()
    }

    /// Returns `true` if a socket is live.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.correlator.transport.is_connected()
    }

    /// Number of calls awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.correlator.pending.lock().len()
    }

    /// Returns the options this client was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.correlator.options
    }

    /// Returns the candidate endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.correlator.endpoint
    }
}

// ============================================================================
// Tests
// ============================================================================
