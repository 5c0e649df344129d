//! Client configuration.
//!
//! [`ClientOptions`] mirrors the JSON options object used by middleware
//! front ends, so it deserializes from camelCase JSON and any missing key
//! falls back to its default.
//!
//! # Example
//!
//! ```ignore
//! use xtx_client::ClientOptions;
//!
//! let options: ClientOptions = serde_json::from_str(r#"{ "ports": [5044] }"#)?;
//! assert_eq!(options.host, "ws://127.0.0.1");
//! assert_eq!(options.keep_alive_interval, 60_000);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::{Endpoint, ReconnectPolicy};

// ============================================================================
// Constants
// ============================================================================

/// Default middleware host.
pub const DEFAULT_HOST: &str = "ws://127.0.0.1";

/// Ports the middleware is known to listen on, in preference order.
pub const DEFAULT_PORTS: [u16; 5] = [4044, 5044, 6044, 7044, 8044];

/// Default keep-alive period in milliseconds.
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 60_000;

/// Default per-call deadline in milliseconds.
///
/// Long because PIN entry on hardware keys waits for the user.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10 * 60 * 1000;

// ============================================================================
// ClientOptions
// ============================================================================

/// Connection and call settings.
///
/// All durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
    /// WebSocket base URL without port.
    pub host: String,

    /// Candidate ports; the first is tried on connect.
    pub ports: Vec<u16>,

    /// Optional URL path.
    pub path: String,

    /// Keep-alive period. 0 sends a single keep-alive per connect.
    pub keep_alive_interval: u64,

    /// Delay between reconnection attempts.
    pub reconnect_interval: u64,

    /// Reconnection attempts before giving up.
    pub reconnect_attempts: u32,

    /// Deadline for each call.
    pub call_timeout: u64,

    /// Deadline for each connect attempt.
    pub connect_timeout: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: DEFAULT_PORTS.to_vec(),
            path: String::new(),
            keep_alive_interval: DEFAULT_KEEP_ALIVE_MS,
            reconnect_interval: policy.interval.as_millis() as u64,
            reconnect_attempts: policy.max_attempts,
            call_timeout: DEFAULT_CALL_TIMEOUT_MS,
            connect_timeout: policy.connect_timeout.as_millis() as u64,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a partial JSON options object over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not a valid options object.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the WebSocket base URL.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Replaces the candidate ports.
    #[inline]
    #[must_use]
    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports = ports.into_iter().collect();
        self
    }

    /// Sets the URL path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the keep-alive period; zero means once per connect.
    #[inline]
    #[must_use]
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval.as_millis() as u64;
        self
    }

    /// Sets the delay between reconnection attempts.
    #[inline]
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval.as_millis() as u64;
        self
    }

    /// Sets the reconnection budget.
    #[inline]
    #[must_use]
    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Sets the per-call deadline.
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout.as_millis() as u64;
        self
    }

    /// Sets the per-connect deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout.as_millis() as u64;
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl ClientOptions {
    /// Keep-alive period, or `None` for a single keep-alive per connect.
    #[inline]
    #[must_use]
    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_interval > 0).then(|| Duration::from_millis(self.keep_alive_interval))
    }

    /// Per-call deadline.
    #[inline]
    #[must_use]
    pub fn call_deadline(&self) -> Duration {
        Duration::from_millis(self.call_timeout)
    }

    /// Reconnection policy for the transport.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            interval: Duration::from_millis(self.reconnect_interval),
            max_attempts: self.reconnect_attempts,
            connect_timeout: Duration::from_millis(self.connect_timeout),
        }
    }

    /// Builds the candidate endpoint list.
    ///
    /// # Errors
    ///
    /// See [`Endpoint::from_host_ports`].
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::from_host_ports(&self.host, &self.ports, &self.path)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no port is given
    /// - [`Error::Config`] if the call or connect timeout is zero
    /// - Any error of [`ClientOptions::endpoint`]
    pub fn validate(&self) -> Result<()> {
        if self.ports.is_empty() {
            return Err(Error::config("at least one port is required"));
        }
        if self.call_timeout == 0 {
            return Err(Error::config("call timeout must be greater than zero"));
        }
        if self.connect_timeout == 0 {
            return Err(Error::config("connect timeout must be greater than zero"));
        }
        self.endpoint().map(|_| ())
    }
}

// ============================================================================
// Tests
// ============================================================================
