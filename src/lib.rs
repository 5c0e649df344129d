//! XTX client - call/response layer for local signing middleware.
//!
//! This library talks to a USB-key or soft-certificate signing middleware
//! that runs as a WebSocket server on the local machine. Callers issue
//! remote operations as single async calls; the middleware also pushes
//! hardware events (key inserted/removed) over the same socket.
//!
//! # Architecture
//!
//! The crate is layered bottom-up:
//!
//! - **Transport**: one WebSocket with bounded fixed-interval reconnection
//!   and a connectivity status signal
//! - **Client**: call ids, pending call registry, per-call timeouts, reply
//!   routing, push events and keep-alive
//! - **Operations**: named middleware functions with decoded results
//!
//! Key design principles:
//!
//! - Frames carry `call_cmd_id`: numeric ids are replies, anything else
//!   names a push event
//! - Nothing is queued while disconnected; calls fail with
//!   [`Error::NoConnection`]
//! - Every state change is published on one broadcast [`Event`] stream
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use xtx_client::{Client, DeviceType, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder().build()?;
//!     client.connect().await;
//!     client.wait_connected(Duration::from_secs(10)).await?;
//!
//!     for user in client.get_user_list(DeviceType::Hard).await? {
//!         println!("{} ({})", user.username, user.cert_id);
//!     }
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cert`] | User list and certificate field decoding |
//! | [`client`] | [`Client`], [`ClientBuilder`], [`ClientOptions`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Call ids and their generator |
//! | [`protocol`] | Wire frames, method names, events |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Certificate helpers.
///
/// Decoders for the flat strings the middleware returns.
pub mod cert;

/// Correlation client and configuration.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Call identifiers.
pub mod identifiers;

/// Wire protocol types.
///
/// Outbound requests, inbound frames, method names and events.
pub mod protocol;

/// WebSocket transport layer.
///
/// Connection, reconnection and connectivity status.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Certificate types
pub use cert::{CertInfo, CertKind, DeviceType, UserInfo, parse_cert_list};

// Client types
pub use client::{Client, ClientBuilder, ClientOptions};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, CallIdGenerator};

// Protocol types
pub use protocol::{Action, Event, InboundFrame, Method, Param, Params, PushKind};

// Transport types
pub use transport::{ConnectionStatus, Endpoint, ReconnectPolicy};
