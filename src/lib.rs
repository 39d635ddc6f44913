//! geobot - a Messenger geocoding bot.
//!
//! Receives chat events (text, shared locations, button postbacks) from the
//! Messenger webhook, tracks a small per-user conversation state, matches
//! free-text intent against fixed patterns, and answers geographic queries
//! through the Google Maps geocoding service.
//!
//! ## Architecture
//!
//! ```text
//! Messenger → POST /webhook → Dispatcher → GeocodeClient (forward/reverse)
//!                                  ↓
//!            user ←── Send API ── ReplySink
//! ```
//!
//! The [`dispatch::Dispatcher`] is the only stateful piece: it owns the
//! [`session::SessionStore`] and decides, per event, whether to complete a
//! pending command or classify a new one.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod geocode;
pub mod logging;
pub mod outbound;
pub mod routes;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{classify_intent, BotTexts, Dispatcher};
pub use error::{Error, GeocodeError, Result, SendError};
pub use event::{parse_webhook_payload, Event, PostbackPayload};
pub use geocode::{latlng_key, GeocodeClient, Place};
pub use logging::init_logging;
pub use outbound::{MessengerClient, QuickReply, ReplySink};
pub use routes::{build_router, AppState};
pub use session::{Command, Session, SessionStore};

use std::net::SocketAddr;
use std::sync::Arc;

/// Wire a dispatcher and router from configuration and an outbound sink.
///
/// Fails only if the geocoding HTTP client cannot be constructed, which is
/// fatal at startup.
pub fn build_app(config: &Config, sink: Arc<dyn ReplySink>) -> Result<axum::Router> {
    let geocode = GeocodeClient::new(&config.geocode)?;
    let dispatcher = Arc::new(Dispatcher::new(
        SessionStore::new(),
        geocode,
        sink,
        BotTexts::default(),
    ));

    let state = Arc::new(AppState {
        dispatcher,
        verify_token: config.messenger.verify_token.clone(),
        app_secret: config.messenger.app_secret.clone(),
    });

    Ok(build_router(state))
}

/// Start the webhook server: configure the Messenger profile, then serve.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let messenger = Arc::new(MessengerClient::new(config.messenger.access_token.clone()));

    // Persistent menu, greeting and Get Started button. A failure here means
    // the credentials are bad, which is fatal at startup rather than
    // per-event.
    messenger.setup_profile().await?;

    let router = build_app(config, messenger)?;

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    tracing::info!("Starting geobot on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
