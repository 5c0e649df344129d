//! Error types for the middleware client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use xtx_client::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let version = client.get_version().await?;
//!     println!("middleware {version}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::NoConnection`], [`Error::ConnectionRefused`], [`Error::ConnectionTimeout`] |
//! | Call | [`Error::CallTimeout`], [`Error::CallAbandoned`], [`Error::DuplicateCallId`] |
//! | Protocol | [`Error::MalformedFrame`], [`Error::Protocol`], [`Error::InvalidArgument`] |
//! | External | [`Error::Json`], [`Error::Url`] |
//!
//! Stale replies (a reply whose call is gone) are never an error returned
//! to a caller; they only surface on the event stream.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::CallId;
use crate::protocol::Method;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// No active connection to send on.
    ///
    /// Returned immediately; nothing is queued while disconnected.
    #[error("No active connection")]
    NoConnection,

    /// Reconnection attempts exhausted.
    ///
    /// Fatal for the current transport until it is opened again.
    #[error("Connection refused after {attempts} reconnection attempts")]
    ConnectionRefused {
        /// Number of reconnection attempts made.
        attempts: u32,
    },

    /// Connection attempt did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Call Errors
    // ========================================================================
    /// No reply arrived before the call deadline.
    #[error("Call {call_id} ({method}) timed out after {timeout_ms}ms")]
    CallTimeout {
        /// The call that timed out.
        call_id: CallId,
        /// Remote method of the call.
        method: Method,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The connection dropped while the call was outstanding.
    #[error("Call {call_id} abandoned: connection lost")]
    CallAbandoned {
        /// The abandoned call.
        call_id: CallId,
    },

    /// An identifier was allocated while a call with the same id is outstanding.
    #[error("Call id {call_id} is still outstanding")]
    DuplicateCallId {
        /// The colliding identifier.
        call_id: CallId,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound message could not be decoded.
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Description of the decoding failure.
        message: String,
    },

    /// Unexpected reply content.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Invalid argument for a remote operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection refused error.
    #[inline]
    pub fn connection_refused(attempts: u32) -> Self {
        Self::ConnectionRefused { attempts }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a call timeout error.
    #[inline]
    pub fn call_timeout(call_id: CallId, method: Method, timeout_ms: u64) -> Self {
        Self::CallTimeout {
            call_id,
            method,
            timeout_ms,
        }
    }

    /// Creates a call abandoned error.
    #[inline]
    pub fn call_abandoned(call_id: CallId) -> Self {
        Self::CallAbandoned { call_id }
    }

    /// Creates a duplicate call id error.
    #[inline]
    pub fn duplicate_call_id(call_id: CallId) -> Self {
        Self::DuplicateCallId { call_id }
    }

    /// Creates a malformed frame error.
    #[inline]
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::CallTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NoConnection
                | Self::ConnectionRefused { .. }
                | Self::ConnectionTimeout { .. }
                | Self::CallAbandoned { .. }
        )
    }

    /// Returns `true` if the transport gave up and must be reopened.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionRefused { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed when the call is issued again.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoConnection
                | Self::ConnectionTimeout { .. }
                | Self::CallTimeout { .. }
                | Self::CallAbandoned { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
