//! Middleware endpoint and reconnection policy.
//!
//! The middleware listens on one of several well-known local ports. An
//! [`Endpoint`] holds the ordered candidate URLs; the first one is tried on
//! open and reconnection attempts rotate through the rest.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Default reconnection attempts before giving up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 10;

/// Default bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Endpoint
// ============================================================================

/// Ordered candidate addresses of the middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    candidates: Vec<Url>,
}

impl Endpoint {
    /// Creates an endpoint from candidate URLs.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the list is empty
    /// - [`Error::Config`] if a URL is not `ws://` or `wss://`
    pub fn new(candidates: Vec<Url>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(Error::config("endpoint needs at least one candidate address"));
        }

        if let Some(bad) = candidates
            .iter()
            .find(|url| !matches!(url.scheme(), "ws" | "wss"))
        {
            return Err(Error::config(format!(
                "unsupported scheme in {bad}: expected ws or wss"
            )));
        }

        Ok(Self { candidates })
    }

    /// Creates an endpoint from a single URL string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the string is not a URL, or
    /// [`Error::Config`] if its scheme is not `ws`/`wss`.
    pub fn parse(url: &str) -> Result<Self> {
        Self::new(vec![Url::parse(url)?])
    }

    /// Builds one candidate per port: `{host}:{port}{path}`.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the host does not parse as a URL
    /// - [`Error::Config`] if `ports` is empty or contains 0
    pub fn from_host_ports(host: &str, ports: &[u16], path: &str) -> Result<Self> {
        if ports.contains(&0) {
            return Err(Error::config("port 0 is not a valid middleware port"));
        }

        let base = Url::parse(host)?;
        let mut candidates = Vec::with_capacity(ports.len());

        for &port in ports {
            let mut url = base.clone();
            url.set_port(Some(port))
                .map_err(|()| Error::config(format!("host {host} cannot carry a port")))?;
            if !path.is_empty() {
                url.set_path(path);
            }
            candidates.push(url);
        }

        Self::new(candidates)
    }

    /// Returns the first candidate.
    #[inline]
    #[must_use]
    pub fn primary(&self) -> &Url {
        &self.candidates[0]
    }

    /// Returns the candidate at `index`, wrapping around the list.
    ///
    /// Index 0 is the primary.
    #[inline]
    #[must_use]
    pub fn candidate(&self, index: usize) -> &Url {
        &self.candidates[index % self.candidates.len()]
    }

    /// Returns all candidates in order.
    #[inline]
    #[must_use]
    pub fn candidates(&self) -> &[Url] {
        &self.candidates
    }
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Bounded fixed-interval reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before each reconnection attempt.
    pub interval: Duration,
    /// Attempts before the transport gives up. 0 disables reconnection.
    pub max_attempts: u32,
    /// Bound on a single connect attempt.
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
