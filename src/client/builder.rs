//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use xtx_client::Client;
//!
//! # fn example() -> xtx_client::Result<()> {
//! let client = Client::builder()
//!     .port(4044)
//!     .call_timeout(Duration::from_secs(120))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;

use super::core::Client;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder. Unset values keep
/// their [`ClientOptions`] defaults.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    options: ClientOptions,
    /// Ports replace the defaults on the first `port()` call.
    ports_overridden: bool,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket base URL.
    ///
    /// # Arguments
    ///
    /// * `host` - Base URL without port (e.g., "ws://127.0.0.1")
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    /// Adds a candidate port.
    ///
    /// The first call replaces the default port list.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        if !self.ports_overridden {
            self.options.ports.clear();
            self.ports_overridden = true;
        }
        self.options.ports.push(port);
        self
    }

    /// Replaces the candidate ports.
    #[inline]
    #[must_use]
    pub fn ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.options.ports = ports.into_iter().collect();
        self.ports_overridden = true;
        self
    }

    /// Sets the URL path.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.options.path = path.into();
        self
    }

    /// Sets the keep-alive period. Zero sends one keep-alive per connect.
    #[inline]
    #[must_use]
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.options = self.options.with_keep_alive_interval(interval);
        self
    }

    /// Sets the delay between reconnection attempts.
    #[inline]
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.options = self.options.with_reconnect_interval(interval);
        self
    }

    /// Sets the reconnection budget.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(mut self, attempts: u32) -> Self {
        self.options.reconnect_attempts = attempts;
        self
    }

    /// Sets the per-call deadline.
    #[inline]
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_call_timeout(timeout);
        self
    }

    /// Sets the per-connect deadline.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_connect_timeout(timeout);
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self.ports_overridden = true;
        self
    }

    /// Builds the client with validation.
    ///
    /// The client is not connected; call [`Client::connect`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the options are invalid
    /// - [`Error::Url`](crate::Error::Url) if the host is not a URL
    pub fn build(self) -> Result<Client> {
        Client::new(self.options)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_default_options() {
        let builder = ClientBuilder::new();
        assert_eq!(builder.options, ClientOptions::default());
    }

    #[test]
    fn test_port_replaces_defaults_then_appends() {
        let builder = ClientBuilder::new().port(9001).port(9002);
        assert_eq!(builder.options.ports, vec![9001, 9002]);
    }

    #[test]
    fn test_durations_stored_in_millis() {
        let builder = ClientBuilder::new()
            .keep_alive_interval(Duration::ZERO)
            .reconnect_interval(Duration::from_millis(250))
            .call_timeout(Duration::from_secs(3));

        assert_eq!(builder.options.keep_alive_interval, 0);
        assert_eq!(builder.options.reconnect_interval, 250);
        assert_eq!(builder.options.call_timeout, 3_000);
    }

    #[test]
    fn test_build_rejects_empty_ports() {
        let result = ClientBuilder::new().ports([]).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_bad_host() {
        let result = ClientBuilder::new().host("http://127.0.0.1").build();
        assert!(result.is_err());
    }
}
