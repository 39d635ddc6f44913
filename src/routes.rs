//! HTTP routes for the Messenger webhook.
//!
//! - `GET /webhook` — Meta's verification handshake (echoes `hub.challenge`)
//! - `POST /webhook` — event intake; acks 200 immediately and processes each
//!   event on its own task so one user's lookup never stalls another's
//! - `GET /healthz` — liveness

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::dispatch::Dispatcher;
use crate::event::parse_webhook_payload;

/// Shared state for the webhook server.
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Token echoed back during webhook verification
    pub verify_token: String,
    /// App secret for X-Hub-Signature-256 checks (None disables them)
    pub app_secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct WebhookResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Build the webhook router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "geobot",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Meta webhook verification query params.
#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook — Meta webhook verification.
async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyQuery>,
) -> impl IntoResponse {
    // Constant-time token comparison to prevent timing attacks
    let token_matches = params.verify_token.as_deref().is_some_and(|t| {
        let expected = state.verify_token.as_bytes();
        t.len() == expected.len()
            && t.as_bytes()
                .iter()
                .zip(expected)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    });

    if params.mode.as_deref() == Some("subscribe") && token_matches {
        if let Some(challenge) = params.challenge {
            tracing::info!("webhook verified");
            return (StatusCode::OK, challenge);
        }
        return (StatusCode::BAD_REQUEST, "Missing hub.challenge".to_string());
    }

    tracing::warn!("webhook verification failed: token mismatch");
    (StatusCode::FORBIDDEN, "Forbidden".to_string())
}

/// Verify a Meta webhook signature (`X-Hub-Signature-256: sha256=<hex>`).
fn verify_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// POST /webhook — incoming event batch.
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(ref app_secret) = state.app_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !verify_signature(app_secret, &body, signature) {
            tracing::warn!(
                "webhook signature verification failed (signature: {})",
                if signature.is_empty() { "missing" } else { "invalid" }
            );
            return (
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse {
                    success: false,
                    message: Some("Invalid signature".to_string()),
                }),
            );
        }
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("unparseable webhook body: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse {
                    success: false,
                    message: Some("Invalid JSON".to_string()),
                }),
            );
        }
    };

    let events = parse_webhook_payload(&payload);
    tracing::debug!(count = events.len(), "webhook events received");

    // Ack immediately; each event runs on its own task so users don't
    // block each other on geocoding I/O
    for event in events {
        let dispatcher = state.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.handle_event(event).await;
        });
    }

    (
        StatusCode::OK,
        Json(WebhookResponse {
            success: true,
            message: None,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn signature_roundtrip() {
        let body = br#"{"object":"page"}"#;
        let header = sign("app-secret", body);
        assert!(verify_signature("app-secret", body, &header));
    }

    #[test]
    fn signature_rejects_tampered_body() {
        let header = sign("app-secret", b"original");
        assert!(!verify_signature("app-secret", b"tampered", &header));
    }

    #[test]
    fn signature_rejects_bad_header_shapes() {
        assert!(!verify_signature("s", b"x", ""));
        assert!(!verify_signature("s", b"x", "md5=abcd"));
        assert!(!verify_signature("s", b"x", "sha256=nothex!"));
    }
}
