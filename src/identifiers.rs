//! Type-safe identifiers for remote calls.
//!
//! Call identifiers travel on the wire as decimal strings in `call_cmd_id`.
//! The middleware peer represents them as IEEE-754 doubles, so the counter
//! never goes past [`CallId::MAX`] (2^53 - 1) and wraps back to 1.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::{Serialize, Serializer};

// ============================================================================
// CallId
// ============================================================================

/// Identifier of one outstanding remote call.
///
/// Unique only among calls that are outstanding at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(NonZeroU64);

impl CallId {
    /// Largest identifier the wire peer can represent exactly.
    pub const MAX: u64 = (1 << 53) - 1;

    /// Creates a call id, rejecting 0 and values above [`CallId::MAX`].
    #[inline]
    #[must_use]
    pub fn new(value: u64) -> Option<Self> {
        if value > Self::MAX {
            return None;
        }
        NonZeroU64::new(value).map(Self)
    }

    /// Returns the numeric value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Interprets a numeric wire identifier.
    ///
    /// Returns `None` for values that no allocated call can carry
    /// (fractions, negatives, zero, out of range).
    #[must_use]
    pub fn from_wire(value: f64) -> Option<Self> {
        if !value.is_finite() || value.fract() != 0.0 || value < 1.0 || value > Self::MAX as f64 {
            return None;
        }
        Self::new(value as u64)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for CallId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.get())
    }
}

// ============================================================================
// CallIdGenerator
// ============================================================================

/// Monotonic call id counter owned by one client.
///
/// Starts at 1 and wraps to 1 after [`CallId::MAX`].
#[derive(Debug, Default)]
pub struct CallIdGenerator {
    last: u64,
}

impl CallIdGenerator {
    /// Creates a counter whose first id is 1.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// Creates a counter that continues after `last`.
    #[inline]
    #[must_use]
    pub const fn starting_after(last: u64) -> Self {
        Self { last }
    }

    /// Allocates the next identifier.
    pub fn next_id(&mut self) -> CallId {
        let next = NonZeroU64::new(self.last.wrapping_add(1))
            .filter(|v| v.get() <= CallId::MAX)
            .unwrap_or(NonZeroU64::MIN);
        self.last = next.get();
        CallId(next)
    }
}

// ============================================================================
// Tests
// ============================================================================
