//! WebSocket protocol message types.
//!
//! This module defines the JSON frames exchanged with the signing
//! middleware and the event records the client publishes.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Middleware | Call a middleware function |
//! | `InboundFrame` (numeric id) | Middleware → Local | Reply to a call |
//! | `InboundFrame` (symbolic id) | Middleware → Local | Push notification |
//! | `Event` | Client → Subscribers | Lifecycle, traffic and push records |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Event records and actions |
//! | `method` | Method names and positional params |
//! | `request` | Request and inbound frame types |

// ============================================================================
// Submodules
// ============================================================================

/// Event records published to subscribers.
pub mod event;

/// Remote method names and call parameters.
pub mod method;

/// Request and inbound frame types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{Action, Event, PushKind};
pub use method::{Method, Param, Params};
pub use request::{FrameTarget, InboundFrame, Request};
