//! WebSocket transport layer.
//!
//! This module owns the physical connection to the signing middleware,
//! which runs as a local WebSocket server on one of a few known ports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Client (Rust)  │                              │  Middleware     │
//! │                 │         WebSocket            │  (USB key /     │
//! │  Transport      │◄────────────────────────────►│   soft cert)    │
//! │  → socket task  │   ws://127.0.0.1:{4044,..}   │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Transport::open` - Spawn the socket task against the first candidate
//! 2. `Incoming` - Receive lifecycle notices and inbound frames
//! 3. `Transport::send` - Enqueue frames while connected
//! 4. Reconnection - Fixed interval, bounded attempts, rotating candidates
//! 5. `Transport::close` - Stop the task and cancel reconnection
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Transport handle, socket task and incoming stream |
//! | `endpoint` | Candidate addresses and reconnection policy |

// ============================================================================
// Submodules
// ============================================================================

/// Transport handle and socket task.
pub mod connection;

/// Candidate addresses and reconnection policy.
pub mod endpoint;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ConnectionStatus, Incoming, IncomingItem, Transport, TransportEvent};
pub use endpoint::{Endpoint, ReconnectPolicy};
