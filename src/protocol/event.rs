//! Client event records.
//!
//! Every lifecycle transition, send, receive, push notification and
//! internal fault is published as one [`Event`] on the client's event
//! stream.
//!
//! # Actions
//!
//! | Group | Actions |
//! |-------|---------|
//! | Lifecycle | `connecting`, `connected`, `disconnected`, `reconnecting`, `socketClosed`, `socketClosedWithException` |
//! | Traffic | `wsSend`, `wsRecv`, `wsNoneAvailable` |
//! | Faults | `invalidRecvCallbackFunction`, `invalidRecvedData`, `exception` |
//! | Push | `usbkeyChange`, `debugChange`, `unknownEvent` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Serialize, Serializer};

use crate::identifiers::CallId;

use super::InboundFrame;

// ============================================================================
// PushKind
// ============================================================================

/// Event names the middleware pushes without a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushKind {
    /// A key was inserted or removed; `retVal` is `insert` or `remove`.
    UsbkeyChange,
    /// Middleware debug mode toggled.
    DebugChange,
    /// Any name not listed above.
    Unknown,
}

impl PushKind {
    /// Maps a wire event name, normalizing unknown names.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "usbkeyChange" => PushKind::UsbkeyChange,
            "debugChange" => PushKind::DebugChange,
            _ => PushKind::Unknown,
        }
    }

    /// Returns the action tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PushKind::UsbkeyChange => "usbkeyChange",
            PushKind::DebugChange => "debugChange",
            PushKind::Unknown => "unknownEvent",
        }
    }
}

// ============================================================================
// Action
// ============================================================================

/// Discriminator of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// First connect attempt of a `connect()` started.
    Connecting,
    /// Socket established (initially or after reconnecting).
    Connected,
    /// Socket lost or client disconnected.
    Disconnected,
    /// A reconnection attempt is scheduled.
    Reconnecting,
    /// Transport closed gracefully.
    SocketClosed,
    /// Transport gave up after exhausting reconnection.
    SocketClosedWithException,
    /// A request frame was handed to the transport.
    Send,
    /// A reply completed its pending call.
    Recv,
    /// A call was attempted without a connection.
    NoneAvailable,
    /// A reply matched no pending call.
    InvalidReply,
    /// An inbound message could not be decoded.
    InvalidFrame,
    /// A call or operation failed.
    Exception,
    /// Server push.
    Push(PushKind),
}

impl Action {
    /// Returns the action tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Connecting => "connecting",
            Action::Connected => "connected",
            Action::Disconnected => "disconnected",
            Action::Reconnecting => "reconnecting",
            Action::SocketClosed => "socketClosed",
            Action::SocketClosedWithException => "socketClosedWithException",
            Action::Send => "wsSend",
            Action::Recv => "wsRecv",
            Action::NoneAvailable => "wsNoneAvailable",
            Action::InvalidReply => "invalidRecvCallbackFunction",
            Action::InvalidFrame => "invalidRecvedData",
            Action::Exception => "exception",
            Action::Push(kind) => kind.as_str(),
        }
    }

    /// Returns `true` for server pushes.
    #[inline]
    #[must_use]
    pub const fn is_push(self) -> bool {
        matches!(self, Action::Push(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Event
// ============================================================================

/// One observable change in the client or its transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// What happened.
    pub action: Action,

    /// Inbound frame, for receives, pushes and stale replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<InboundFrame>,

    /// Call the event refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<CallId>,

    /// Human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Event {
    /// Creates an event with only an action.
    #[inline]
    #[must_use]
    pub fn new(action: Action) -> Self {
        Self {
            action,
            payload: None,
            msg_id: None,
            message: None,
        }
    }

    /// Attaches an inbound frame.
    #[inline]
    #[must_use]
    pub fn with_payload(mut self, payload: InboundFrame) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attaches a call id.
    #[inline]
    #[must_use]
    pub fn with_msg_id(mut self, msg_id: CallId) -> Self {
        self.msg_id = Some(msg_id);
        self
    }

    /// Attaches a message.
    #[inline]
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Builds the event for a server push.
    #[must_use]
    pub fn push(frame: InboundFrame) -> Self {
        let kind = PushKind::from_name(&frame.call_cmd_id);
        Self::new(Action::Push(kind)).with_payload(frame)
    }

    /// Returns the push payload value (`retVal`), if any.
    #[inline]
    #[must_use]
    pub fn ret_val(&self) -> Option<&str> {
        self.payload.as_ref().map(|p| p.ret_val.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_kind_from_name() {
        assert_eq!(PushKind::from_name("usbkeyChange"), PushKind::UsbkeyChange);
        assert_eq!(PushKind::from_name("debugChange"), PushKind::DebugChange);
        assert_eq!(PushKind::from_name("somethingElse"), PushKind::Unknown);
        assert_eq!(PushKind::from_name("onUsbkeyChange"), PushKind::Unknown);
    }

    #[test]
    fn test_push_event() {
        let event = Event::push(InboundFrame::new("usbkeyChange", "insert"));
        assert_eq!(event.action, Action::Push(PushKind::UsbkeyChange));
        assert_eq!(event.action.as_str(), "usbkeyChange");
        assert_eq!(event.ret_val(), Some("insert"));
        assert!(event.action.is_push());
    }

    #[test]
    fn test_unknown_push_keeps_payload() {
        let event = Event::push(InboundFrame::new("batteryLow", "5"));
        assert_eq!(event.action.as_str(), "unknownEvent");
        assert_eq!(
            event.payload.as_ref().map(|p| p.call_cmd_id.as_str()),
            Some("batteryLow")
        );
    }

    #[test]
    fn test_event_serialization() {
        let id = CallId::new(3).expect("valid call id");
        let event = Event::new(Action::Recv)
            .with_msg_id(id)
            .with_payload(InboundFrame::new("3", "V3"));

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({
                "action": "wsRecv",
                "payload": { "call_cmd_id": "3", "retVal": "V3" },
                "msgId": 3
            })
        );
    }

    #[test]
    fn test_minimal_event_serialization() {
        let value = serde_json::to_value(Event::new(Action::Disconnected)).expect("serialize");
        assert_eq!(value, json!({ "action": "disconnected" }));
    }
}
