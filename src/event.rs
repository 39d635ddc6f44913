//! Inbound event model.
//!
//! Messenger delivers webhook payloads as an `entry[].messaging[]`
//! envelope; each messaging entry is flattened here into one [`Event`].
//! The core treats events as read-only values and never persists them.

use serde::{Deserialize, Serialize};

/// A single inbound chat event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// Free-text message
    Text { sender_id: String, text: String },
    /// Shared device location
    Location {
        sender_id: String,
        lat: f64,
        lng: f64,
    },
    /// Button tap (menu quick reply, persistent menu, Get Started)
    Postback {
        sender_id: String,
        payload: PostbackPayload,
    },
    /// Message with an attachment the bot does not handle (image, sticker, ...)
    Unsupported { sender_id: String },
}

impl Event {
    /// Stable user identifier of the event's sender.
    pub fn sender_id(&self) -> &str {
        match self {
            Self::Text { sender_id, .. }
            | Self::Location { sender_id, .. }
            | Self::Postback { sender_id, .. }
            | Self::Unsupported { sender_id } => sender_id,
        }
    }

    /// Get the text content if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Check if this event carries a location attachment.
    pub const fn is_location(&self) -> bool {
        matches!(self, Self::Location { .. })
    }
}

/// Known postback button payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostbackPayload {
    Start,
    Coordinates,
    FullAddress,
    Location,
    Other(String),
}

impl PostbackPayload {
    /// Wire value sent in quick-reply and persistent-menu buttons.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "START",
            Self::Coordinates => "COORDINATES",
            Self::FullAddress => "FULL_ADDRESS",
            Self::Location => "LOCATION",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Parse a wire payload; unknown values are preserved as `Other`.
    pub fn parse(payload: &str) -> Self {
        match payload {
            "START" => Self::Start,
            "COORDINATES" => Self::Coordinates,
            "FULL_ADDRESS" => Self::FullAddress,
            "LOCATION" => Self::Location,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Parse a Messenger webhook envelope into events.
///
/// Unknown or partial entries are skipped, never fatal: the platform
/// redelivers on non-200 responses, so a malformed entry must not poison
/// the whole batch.
pub fn parse_webhook_payload(payload: &serde_json::Value) -> Vec<Event> {
    let mut events = Vec::new();

    let Some(entries) = payload.get("entry").and_then(|e| e.as_array()) else {
        return events;
    };

    for entry in entries {
        let Some(messaging) = entry.get("messaging").and_then(|m| m.as_array()) else {
            continue;
        };

        for item in messaging {
            let Some(sender_id) = item
                .pointer("/sender/id")
                .and_then(|id| id.as_str())
                .map(str::to_string)
            else {
                tracing::debug!("skipping messaging entry without sender id");
                continue;
            };

            if let Some(postback) = item.get("postback") {
                let payload = postback
                    .get("payload")
                    .and_then(|p| p.as_str())
                    .unwrap_or_default();
                events.push(Event::Postback {
                    sender_id,
                    payload: PostbackPayload::parse(payload),
                });
                continue;
            }

            let Some(message) = item.get("message") else {
                tracing::debug!("skipping messaging entry without message or postback");
                continue;
            };

            if let Some(attachments) = message.get("attachments").and_then(|a| a.as_array()) {
                events.push(parse_attachment(sender_id, attachments));
                continue;
            }

            if let Some(text) = message.get("text").and_then(|t| t.as_str()) {
                events.push(Event::Text {
                    sender_id,
                    text: text.to_string(),
                });
            }
        }
    }

    events
}

/// Classify the first attachment: a well-formed location becomes
/// [`Event::Location`]; anything else (including a location attachment
/// missing its coordinate fields) is [`Event::Unsupported`].
fn parse_attachment(sender_id: String, attachments: &[serde_json::Value]) -> Event {
    let Some(first) = attachments.first() else {
        return Event::Unsupported { sender_id };
    };

    if first.get("type").and_then(|t| t.as_str()) != Some("location") {
        return Event::Unsupported { sender_id };
    }

    // Messenger spells longitude "long" in location payloads
    let coords = first.pointer("/payload/coordinates");
    let lat = coords.and_then(|c| c.get("lat")).and_then(|v| v.as_f64());
    let lng = coords.and_then(|c| c.get("long")).and_then(|v| v.as_f64());

    match (lat, lng) {
        (Some(lat), Some(lng)) => Event::Location {
            sender_id,
            lat,
            lng,
        },
        _ => {
            tracing::warn!(%sender_id, "location attachment missing coordinates");
            Event::Unsupported { sender_id }
        }
    }
}
