//! Outbound request and inbound frame types.
//!
//! # Request
//!
//! ```json
//! {
//!   "xtx_func_name": "SOF_GetCertInfo",
//!   "call_cmd_id": "12",
//!   "param_1": "MIIE9T...",
//!   "param_2": 17
//! }
//! ```
//!
//! # Inbound
//!
//! ```json
//! { "call_cmd_id": "12", "retVal": "CN=alice" }
//! { "call_cmd_id": "usbkeyChange", "retVal": "insert" }
//! ```
//!
//! Whether an inbound frame is a reply or a push event is decided purely by
//! whether `call_cmd_id` reads as a number. See [`FrameTarget`].

// ============================================================================
// Imports
// ============================================================================

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::identifiers::CallId;

use super::{Method, Params};

// ============================================================================
// Request
// ============================================================================

/// A call request from the client to the middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Identifier for reply correlation.
    pub id: CallId,

    /// Remote function to invoke.
    pub method: Method,

    /// Positional arguments.
    pub params: Params,
}

impl Request {
    /// Creates a new request.
    #[inline]
    #[must_use]
    pub fn new(id: CallId, method: Method, params: impl Into<Params>) -> Self {
        Self {
            id,
            method,
            params: params.into(),
        }
    }

    /// Serializes the request into its JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.params.len()))?;
        map.serialize_entry("xtx_func_name", self.method.as_str())?;
        map.serialize_entry("call_cmd_id", &self.id.to_string())?;
        for (index, param) in self.params.iter().enumerate() {
            map.serialize_entry(&format!("param_{}", index + 1), param)?;
        }
        map.end()
    }
}

// ============================================================================
// InboundFrame
// ============================================================================

/// A message from the middleware: a reply or a push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Decimal call id for replies, event name for pushes.
    pub call_cmd_id: String,

    /// Payload. Missing values read as empty.
    #[serde(rename = "retVal", default)]
    pub ret_val: String,
}

impl InboundFrame {
    /// Creates a frame.
    #[inline]
    #[must_use]
    pub fn new(call_cmd_id: impl Into<String>, ret_val: impl Into<String>) -> Self {
        Self {
            call_cmd_id: call_cmd_id.into(),
            ret_val: ret_val.into(),
        }
    }

    /// Decodes a text message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] if the text is not a JSON object
    /// with a string `call_cmd_id`.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::malformed_frame(e.to_string()))
    }

    /// Classifies the frame by its identifier.
    #[must_use]
    pub fn target(&self) -> FrameTarget<'_> {
        FrameTarget::classify(&self.call_cmd_id)
    }
}

// ============================================================================
// FrameTarget
// ============================================================================

/// Where an inbound frame should be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTarget<'a> {
    /// Reply to a client call.
    ///
    /// `None` when the number is not one any call could carry
    /// (e.g. `"1.5"`, `"-2"`); such replies can never match.
    Reply(Option<CallId>),

    /// Server push; the identifier is the event name.
    Push(&'a str),
}

impl<'a> FrameTarget<'a> {
    /// Reads `call_cmd_id`: anything that parses as a finite number is a
    /// reply, everything else names a push event.
    ///
    /// Only decimal notation counts: an empty or blank id and hex such as
    /// `"0x10"` name push events. A purely numeric event name would be
    /// routed as a reply.
    #[must_use]
    pub fn classify(call_cmd_id: &'a str) -> Self {
        match call_cmd_id.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => FrameTarget::Reply(CallId::from_wire(value)),
            _ => FrameTarget::Push(call_cmd_id),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
