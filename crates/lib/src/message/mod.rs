//! Normalized inbound messages.
//!
//! The provider POSTs one XML document per message. `decode` turns it into a
//! `NormalizedMessage`: common envelope fields plus one type-specific body.

mod decode;

pub use decode::{decode, RawTagMap};

use chrono::{DateTime, Utc};

/// Declared message type (`MsgType`). Unknown or missing types map to `InvalidType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Image,
    Location,
    Link,
    Event,
    InvalidType,
}

impl MessageType {
    /// Exact match on the wire name; anything else is `InvalidType`.
    pub fn from_wire(s: Option<&str>) -> Self {
        match s {
            Some("text") => MessageType::Text,
            Some("image") => MessageType::Image,
            Some("location") => MessageType::Location,
            Some("link") => MessageType::Link,
            Some("event") => MessageType::Event,
            _ => MessageType::InvalidType,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Location => "location",
            MessageType::Link => "link",
            MessageType::Event => "event",
            MessageType::InvalidType => "invalid_type",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific fields. The variant always matches `NormalizedMessage::msg_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text {
        content: Option<String>,
    },
    Image {
        pic_url: Option<String>,
    },
    Location {
        location_x: Option<String>,
        location_y: Option<String>,
        scale: i64,
        label: Option<String>,
    },
    Link {
        title: Option<String>,
        description: Option<String>,
        url: Option<String>,
    },
    Event {
        event: Option<String>,
        event_key: Option<String>,
        ticket: Option<String>,
        latitude: Option<String>,
        longitude: Option<String>,
        precision: Option<String>,
    },
    Invalid,
}

/// One inbound message after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    pub id: Option<String>,
    /// Raw `CreateTime` value.
    pub timestamp: i64,
    /// `timestamp` read as milliseconds since the epoch.
    pub time: DateTime<Utc>,
    /// `ToUserName`: the account that received the message.
    pub receiver: Option<String>,
    /// `FromUserName`: the user who sent it.
    pub sender: Option<String>,
    pub msg_type: MessageType,
    pub body: MessageBody,
}

impl NormalizedMessage {
    /// Text content, when this is a text message that carries one.
    pub fn content(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text { content } => content.as_deref(),
            _ => None,
        }
    }
}
