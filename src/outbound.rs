//! Outbound replies.
//!
//! [`ReplySink`] is the seam between the dispatch logic and the Messenger
//! Send API: the dispatcher only knows "send text" and "send quick
//! replies". [`MessengerClient`] is the real implementation against the
//! Graph API; tests substitute a recording sink.

use crate::error::SendError;
use async_trait::async_trait;
use serde_json::json;

/// Default Graph API root.
const GRAPH_API: &str = "https://graph.facebook.com/v18.0";

/// A tappable option presented alongside a text prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickReply {
    /// Button with a label and a postback payload
    Text { title: String, payload: String },
    /// Special option that requests the user's device location
    Location,
}

impl QuickReply {
    pub fn text(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Text {
            title: title.into(),
            payload: payload.into(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text { title, payload } => json!({
                "content_type": "text",
                "title": title,
                "payload": payload,
            }),
            Self::Location => json!({ "content_type": "location" }),
        }
    }
}

/// Outbound message capability consumed by the dispatcher.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<(), SendError>;

    /// Send a text prompt with quick-reply options.
    async fn send_quick_replies(
        &self,
        recipient_id: &str,
        text: &str,
        replies: &[QuickReply],
    ) -> Result<(), SendError>;

    /// Show the typing indicator while a lookup is in flight.
    async fn typing_on(&self, recipient_id: &str) -> Result<(), SendError>;
}

/// Messenger Send API client.
pub struct MessengerClient {
    access_token: String,
    graph_url: String,
    client: reqwest::Client,
}

impl MessengerClient {
    /// Create a client against the production Graph API.
    pub fn new(access_token: String) -> Self {
        Self::with_endpoint(access_token, GRAPH_API.to_string())
    }

    /// Create a client against a custom endpoint (tests).
    pub fn with_endpoint(access_token: String, graph_url: String) -> Self {
        Self {
            access_token,
            graph_url,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), SendError> {
        let url = format!("{}/{path}", self.graph_url);
        let response = self
            .client
            .post(&url)
            .query(&[("access_token", self.access_token.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Configure the Messenger profile: Get Started button, greeting text
    /// and the persistent menu. Called once at startup.
    pub async fn setup_profile(&self) -> Result<(), SendError> {
        let body = json!({
            "get_started": { "payload": "START" },
            "greeting": [{
                "locale": "default",
                "text": "Hi {{user_first_name}}! I can find coordinates and addresses for you."
            }],
            "persistent_menu": [{
                "locale": "default",
                "composer_input_disabled": false,
                "call_to_actions": [
                    { "type": "postback", "title": "Start over", "payload": "START" },
                    { "type": "postback", "title": "GPS for address", "payload": "COORDINATES" },
                    { "type": "postback", "title": "Full address", "payload": "FULL_ADDRESS" }
                ]
            }]
        });

        self.post("me/messenger_profile", body).await?;
        tracing::info!("Messenger profile configured");
        Ok(())
    }
}

#[async_trait]
impl ReplySink for MessengerClient {
    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<(), SendError> {
        let body = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": text },
        });
        self.post("me/messages", body).await
    }

    async fn send_quick_replies(
        &self,
        recipient_id: &str,
        text: &str,
        replies: &[QuickReply],
    ) -> Result<(), SendError> {
        let quick_replies: Vec<_> = replies.iter().map(QuickReply::to_json).collect();
        let body = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": text, "quick_replies": quick_replies },
        });
        self.post("me/messages", body).await
    }

    async fn typing_on(&self, recipient_id: &str) -> Result<(), SendError> {
        let body = json!({
            "recipient": { "id": recipient_id },
            "sender_action": "typing_on",
        });
        self.post("me/messages", body).await
    }
}
