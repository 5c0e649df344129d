//! Correlation client and its configuration.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent [`ClientBuilder`] |
//! | `core` | [`Client`], dispatcher and keep-alive |
//! | `operations` | Named middleware operations on [`Client`] |
//! | `options` | [`ClientOptions`] with JSON defaults |
//! | `registry` | Pending call table |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent client configuration.
pub mod builder;

/// Client handle, dispatcher and keep-alive.
pub mod core;

/// Named middleware operations.
pub mod operations;

/// Client options.
pub mod options;

/// Pending call table.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use self::core::{Client, EVENT_CHANNEL_CAPACITY};
pub use operations::{DEFAULT_RANDOM_LEN, DEVICE_TYPE_INFO_CODE};
pub use options::ClientOptions;
pub use registry::{PendingCall, PendingCalls};
