//! Message frames and the JSON envelope they carry.
//!
//! Every frame exchanged over a connection is expected to hold a JSON object
//! with a `type` field:
//!
//! ```text
//! inbound:   {"type":"<name>", ...anything}
//! outbound:  {"type":"<name>"}
//!            {"type":"<name>","data":<payload>}
//! ```
//!
//! Only `type` is interpreted. The rest of an inbound frame is handed to the
//! matching handler untouched, as the raw [`Message`].
//!
//! # Examples
//!
//! ```
//! use msgforge_core::message::Message;
//!
//! let msg = Message::text(r#"{"type":"move","x":3}"#);
//! assert_eq!(msg.kind().as_deref(), Some("move"));
//!
//! let frame = Message::envelope_with("state", &vec![1, 2]).unwrap();
//! assert_eq!(frame.as_text(), Some(r#"{"type":"state","data":[1,2]}"#));
//! ```

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tungstenite::Message as TungsteniteMessage;

/// Reply sent back to a connection whose message type has no handler.
pub const UNKNOWN_TYPE_REPLY: &str = r#"{"type":"Error","message":"Unknown type"}"#;

/// The kind of data frame a [`Message`] was carried in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// UTF-8 text frame.
    Text,
    /// Binary frame.
    Binary,
}

/// A single data frame received from or sent to a peer.
///
/// The payload is kept as [`Bytes`], so cloning a message for extractors is
/// cheap.
#[derive(Debug, Clone)]
pub struct Message {
    /// Raw frame payload.
    pub data: Bytes,
    /// Frame kind.
    pub msg_type: MessageType,
}

#[derive(Deserialize)]
struct TypeField<'a> {
    #[serde(rename = "type", borrow, default)]
    kind: Option<Cow<'a, str>>,
}

impl Message {
    /// Creates a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(text.into()),
            msg_type: MessageType::Text,
        }
    }

    /// Creates a binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            msg_type: MessageType::Binary,
        }
    }

    /// Builds the payload-less envelope `{"type":"<kind>"}`.
    pub fn envelope(kind: &str) -> Result<Self> {
        let kind = serde_json::to_string(kind)?;
        Ok(Self::text(format!(r#"{{"type":{}}}"#, kind)))
    }

    /// Builds the envelope `{"type":"<kind>","data":<data>}`.
    pub fn envelope_with<T: Serialize + ?Sized>(kind: &str, data: &T) -> Result<Self> {
        let kind = serde_json::to_string(kind)?;
        let data = serde_json::to_string(data)?;
        Ok(Self::text(format!(r#"{{"type":{},"data":{}}}"#, kind, data)))
    }

    /// Converts a frame read from the transport.
    ///
    /// Returns `None` for control frames (ping, pong, close and raw frames),
    /// which are never dispatched.
    pub fn from_tungstenite(msg: TungsteniteMessage) -> Option<Self> {
        match msg {
            TungsteniteMessage::Text(text) => Some(Self::text(text)),
            TungsteniteMessage::Binary(data) => Some(Self::binary(data)),
            TungsteniteMessage::Ping(_)
            | TungsteniteMessage::Pong(_)
            | TungsteniteMessage::Close(_)
            | TungsteniteMessage::Frame(_) => None,
        }
    }

    /// Converts into a frame for the transport.
    pub fn into_tungstenite(self) -> TungsteniteMessage {
        match self.msg_type {
            MessageType::Text => match String::from_utf8(self.data.to_vec()) {
                Ok(text) => TungsteniteMessage::Text(text),
                Err(e) => TungsteniteMessage::Binary(e.into_bytes()),
            },
            MessageType::Binary => TungsteniteMessage::Binary(self.data.to_vec()),
        }
    }

    /// Returns the value of the envelope's `type` field.
    ///
    /// Yields `None` when the payload is not a single well-formed JSON
    /// object (trailing characters and repeated `type` keys are rejected),
    /// has no `type`, has a non-string `type`, or has an empty `type`. The
    /// dispatcher treats all of these as an unrecognized type.
    pub fn kind(&self) -> Option<Cow<'_, str>> {
        serde_json::from_slice::<TypeField<'_>>(&self.data)
            .ok()
            .and_then(|field| field.kind)
            .filter(|kind| !kind.is_empty())
    }

    /// Returns the frame kind.
    pub fn message_type(&self) -> MessageType {
        self.msg_type
    }

    /// Returns `true` for text frames.
    pub fn is_text(&self) -> bool {
        self.msg_type == MessageType::Text
    }

    /// Returns `true` for binary frames.
    pub fn is_binary(&self) -> bool {
        self.msg_type == MessageType::Binary
    }

    /// Returns the payload as UTF-8 text, if this is a valid text frame.
    pub fn as_text(&self) -> Option<&str> {
        if self.is_text() {
            std::str::from_utf8(&self.data).ok()
        } else {
            None
        }
    }

    /// Returns the raw payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Deserializes the whole payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.data.is_empty() {
            return Err(Error::InvalidMessage);
        }
        Ok(serde_json::from_slice(&self.data)?)
    }
}
