//! Event dispatch and the per-user state machine.
//!
//! Every inbound event lands here. The dispatcher resolves the sender's
//! session, then either completes the pending command with this event or
//! classifies the event into a new command. A session moves between three
//! states: fresh (never engaged), awaiting a menu choice (engaged, nothing
//! pending) and awaiting command input (a command is waiting for the next
//! message). Completing a command always returns the session to fresh, so
//! the next topic starts from the top-level menu.
//!
//! Events for one user are handled one turn at a time: a webhook batch can
//! carry several events for the same sender and each runs on its own task,
//! so [`Dispatcher::handle_event`] takes a per-user lock for the duration
//! of the turn. Different users never wait on each other.

use crate::error::{Error, Result};
use crate::event::{Event, PostbackPayload};
use crate::geocode::{GeocodeClient, Place};
use crate::outbound::{QuickReply, ReplySink};
use crate::session::{Command, SessionStore};
use dashmap::DashMap;
use regex::RegexSet;
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;

/// Intent patterns, first match wins. Indexes line up with [`INTENT_COMMANDS`].
static INTENT_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([r"(?i)coord|gps", r"(?i)full ad", r"(?i)location"])
        .expect("intent patterns are valid")
});

const INTENT_COMMANDS: [Command; 3] = [
    Command::ShowCoordinates,
    Command::ShowFullAddress,
    Command::LookupLocation,
];

/// Classify free text into a command, if it matches a known pattern.
pub fn classify_intent(text: &str) -> Option<Command> {
    INTENT_PATTERNS
        .matches(text)
        .iter()
        .min()
        .map(|i| INTENT_COMMANDS[i])
}

/// User-facing strings and menu labels. Built once at startup and passed
/// into the dispatcher by value; nothing reads these from globals.
#[derive(Debug, Clone)]
pub struct BotTexts {
    pub menu_greeting: String,
    pub ask_location: String,
    pub ask_location_direct: String,
    pub not_found: String,
    pub not_found_final: String,
    pub fooling: String,
    pub use_location_button: String,
    pub lookup_failed: String,
    pub unknown_address: String,
    pub menu_coordinates: String,
    pub menu_full_address: String,
    pub menu_my_location: String,
}

impl Default for BotTexts {
    fn default() -> Self {
        Self {
            menu_greeting: "What do you want to look up?".into(),
            ask_location: "Type in any destination or send us your location:".into(),
            ask_location_direct: "Let me know your location:".into(),
            not_found: "There were no results. Type your destination again, please".into(),
            not_found_final: "Still no results. Pick an option from the menu and try a different place.".into(),
            fooling: "Why are you trying to fool me, human?".into(),
            use_location_button: "Please try your request again and use 'Send location' button".into(),
            lookup_failed: "Sorry, something went wrong while looking that up. Please try again later.".into(),
            unknown_address: "an address I can't name".into(),
            menu_coordinates: "GPS for address".into(),
            menu_full_address: "Full address".into(),
            menu_my_location: "My location".into(),
        }
    }
}

impl BotTexts {
    /// The top-level quick-reply menu.
    fn menu_replies(&self) -> Vec<QuickReply> {
        vec![
            QuickReply::text(
                self.menu_coordinates.as_str(),
                PostbackPayload::Coordinates.as_str(),
            ),
            QuickReply::text(
                self.menu_full_address.as_str(),
                PostbackPayload::FullAddress.as_str(),
            ),
            QuickReply::text(
                self.menu_my_location.as_str(),
                PostbackPayload::Location.as_str(),
            ),
        ]
    }
}

/// The control-flow hub: session resolution, command completion, intent
/// classification and the geocode reply flows.
pub struct Dispatcher {
    store: SessionStore,
    geocode: GeocodeClient,
    sink: Arc<dyn ReplySink>,
    texts: BotTexts,
    /// One lock per user; held for a whole turn so batched events for the
    /// same sender cannot interleave reads and writes of their session.
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Dispatcher {
    pub fn new(
        store: SessionStore,
        geocode: GeocodeClient,
        sink: Arc<dyn ReplySink>,
        texts: BotTexts,
    ) -> Self {
        Self {
            store,
            geocode,
            sink,
            texts,
            turn_locks: DashMap::new(),
        }
    }

    /// The session registry (exposed for inspection).
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Process one inbound event to completion.
    ///
    /// Events for the same sender run strictly one after another; the next
    /// event for that user waits until this turn has finished, including
    /// its outbound sends. Events for other users are unaffected.
    ///
    /// Never returns an error: every failure is folded into a user-facing
    /// reply (or logged, if even that fails), so a bad lookup cannot crash
    /// the per-event task.
    pub async fn handle_event(&self, event: Event) {
        let sender_id = event.sender_id().to_string();

        // The entry guard is cloned out before awaiting; only the per-user
        // mutex is held across the turn's awaits
        let turn_lock = self
            .turn_locks
            .entry(sender_id.clone())
            .or_default()
            .clone();
        let _turn = turn_lock.lock().await;

        let session = self.store.find_or_create(&sender_id);

        if let Some(command) = session.pending {
            tracing::debug!(%sender_id, ?command, "completing pending command");
            self.run_command(command, &event, &sender_id).await;
            // The turn is complete either way; the session returns to fresh
            self.store.update(&sender_id, |s| {
                s.pending = None;
                s.engaged = false;
            });
            return;
        }

        if !session.engaged {
            self.send_menu(&sender_id).await;
            self.store.update(&sender_id, |s| s.engaged = true);
        }

        self.classify_event(&event, &sender_id).await;
    }

    /// Classify a new event for a session with nothing pending.
    async fn classify_event(&self, event: &Event, sender_id: &str) {
        match event {
            Event::Text { text, .. } => match classify_intent(text) {
                Some(command) => self.set_pending(sender_id, command).await,
                None => {
                    // Not an error; the user stays at the menu
                    tracing::debug!(%sender_id, "unrecognized intent");
                }
            },
            Event::Postback { payload, .. } => match payload {
                PostbackPayload::Start => self.send_menu(sender_id).await,
                PostbackPayload::Coordinates => {
                    self.set_pending(sender_id, Command::ShowCoordinates).await
                }
                PostbackPayload::FullAddress => {
                    self.set_pending(sender_id, Command::ShowFullAddress).await
                }
                // A direct action: does not wait for a follow-up turn
                PostbackPayload::Location => {
                    self.run_command(Command::LookupLocation, event, sender_id)
                        .await
                }
                PostbackPayload::Other(payload) => {
                    tracing::debug!(%sender_id, %payload, "unknown postback payload");
                }
            },
            Event::Location { .. } | Event::Unsupported { .. } => {
                tracing::debug!(%sender_id, "event carries no intent; staying at menu");
            }
        }
    }

    /// Record a pending command and prompt for the follow-up message.
    async fn set_pending(&self, sender_id: &str, command: Command) {
        self.store.update(sender_id, |s| s.pending = Some(command));
        tracing::info!(%sender_id, ?command, "pending command set");

        let prompt = match command {
            Command::LookupLocation => &self.texts.ask_location_direct,
            _ => &self.texts.ask_location,
        };
        if let Err(err) = self
            .sink
            .send_quick_replies(sender_id, prompt, &[QuickReply::Location])
            .await
        {
            tracing::warn!(%sender_id, %err, "failed to send location prompt");
        }
    }

    /// Invoke a command handler, folding any failure into a reply.
    async fn run_command(&self, command: Command, event: &Event, sender_id: &str) {
        let result = match command {
            Command::ShowCoordinates => self.show_coordinates(event, sender_id).await,
            Command::ShowFullAddress => self.show_full_address(event, sender_id).await,
            Command::LookupLocation => self.lookup_location(event, sender_id).await,
        };

        if let Err(err) = result {
            tracing::warn!(%sender_id, ?command, %err, "command failed");
            // A delivery failure gets no second delivery attempt
            if !matches!(err, Error::Send(_)) {
                if let Err(send_err) = self
                    .sink
                    .send_text(sender_id, &self.texts.lookup_failed)
                    .await
                {
                    tracing::warn!(%sender_id, %send_err, "failed to deliver failure reply");
                }
            }
        }
    }

    /// Reply with latitude/longitude for an address or shared location.
    async fn show_coordinates(&self, event: &Event, sender_id: &str) -> Result<()> {
        match event {
            Event::Location { lat, lng, .. } => {
                self.reply_with_reverse_lookup(sender_id, *lat, *lng).await
            }
            Event::Text { text, .. } => {
                self.reply_forward_lookup(sender_id, text, |place| {
                    format!("Latitude: {} / Longitude: {}", place.lat, place.lng)
                })
                .await
            }
            _ => {
                self.sink.send_text(sender_id, &self.texts.fooling).await?;
                Ok(())
            }
        }
    }

    /// Reply with the formatted address for an address or shared location.
    async fn show_full_address(&self, event: &Event, sender_id: &str) -> Result<()> {
        match event {
            Event::Location { lat, lng, .. } => {
                self.reply_with_reverse_lookup(sender_id, *lat, *lng).await
            }
            Event::Text { text, .. } => {
                self.reply_forward_lookup(sender_id, text, |place| {
                    place.formatted_address.clone()
                })
                .await
            }
            _ => {
                self.sink.send_text(sender_id, &self.texts.fooling).await?;
                Ok(())
            }
        }
    }

    /// Reverse-geocode the user's shared location; anything else gets a
    /// "use the Send location button" reply. Never retried.
    async fn lookup_location(&self, event: &Event, sender_id: &str) -> Result<()> {
        if event.sender_id() != sender_id {
            tracing::warn!(
                %sender_id,
                event_sender = %event.sender_id(),
                "event sender does not match session; dropping"
            );
            return Ok(());
        }

        match event {
            Event::Location { lat, lng, .. } => {
                self.reply_with_reverse_lookup(sender_id, *lat, *lng).await
            }
            _ => {
                self.sink
                    .send_text(sender_id, &self.texts.use_location_button)
                    .await?;
                Ok(())
            }
        }
    }

    /// Forward geocode with a single bounded retry on "no results".
    ///
    /// The turn gathers no new input between attempts, so the retry re-runs
    /// the identical query; after a second miss the turn ends with a final
    /// reply instead of looping.
    async fn reply_forward_lookup(
        &self,
        sender_id: &str,
        query: &str,
        render: impl Fn(&Place) -> String,
    ) -> Result<()> {
        self.sink.typing_on(sender_id).await?;

        for attempt in 0..2 {
            match self.geocode.forward(query).await? {
                Some(place) => {
                    self.sink.send_text(sender_id, &render(&place)).await?;
                    return Ok(());
                }
                None if attempt == 0 => {
                    self.sink.send_text(sender_id, &self.texts.not_found).await?;
                }
                None => {
                    self.sink
                        .send_text(sender_id, &self.texts.not_found_final)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Shared reverse-lookup flow: one combined reply with the raw
    /// coordinates and the resolved address. A miss renders a placeholder
    /// address rather than retrying.
    async fn reply_with_reverse_lookup(&self, sender_id: &str, lat: f64, lng: f64) -> Result<()> {
        self.sink.typing_on(sender_id).await?;

        let address = match self.geocode.reverse(lat, lng).await? {
            Some(place) => place.formatted_address,
            None => self.texts.unknown_address.clone(),
        };

        let text = format!(
            "Coordinates of your location: Latitude {lat}, Longitude {lng}. Looks like you're at {address}"
        );
        self.sink.send_text(sender_id, &text).await?;
        Ok(())
    }

    /// Send the top-level quick-reply menu.
    async fn send_menu(&self, sender_id: &str) {
        if let Err(err) = self
            .sink
            .send_quick_replies(
                sender_id,
                &self.texts.menu_greeting,
                &self.texts.menu_replies(),
            )
            .await
        {
            tracing::warn!(%sender_id, %err, "failed to send menu");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeocodeConfig;
    use crate::error::SendError;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text { to: String, text: String },
        Menu { to: String, text: String, replies: Vec<QuickReply> },
        Typing,
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Sent>>,
        latency: Option<Duration>,
    }

    impl RecordingSink {
        /// A sink whose sends take a while, so overlapping turns would
        /// observably interleave.
        fn with_latency(ms: u64) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                latency: Some(Duration::from_millis(ms)),
            }
        }

        async fn record(&self, item: Sent) {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.sent.lock().unwrap().push(item);
        }

        fn all(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.all()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text { text, .. } => Some(text),
                    _ => None,
                })
                .collect()
        }

        fn menu_count(&self) -> usize {
            self.all()
                .iter()
                .filter(|s| {
                    matches!(s, Sent::Menu { text, .. } if text == "What do you want to look up?")
                })
                .count()
        }
    }

    #[async_trait::async_trait]
    impl ReplySink for RecordingSink {
        async fn send_text(
            &self,
            recipient_id: &str,
            text: &str,
        ) -> std::result::Result<(), SendError> {
            self.record(Sent::Text {
                to: recipient_id.to_string(),
                text: text.to_string(),
            })
            .await;
            Ok(())
        }

        async fn send_quick_replies(
            &self,
            recipient_id: &str,
            text: &str,
            replies: &[QuickReply],
        ) -> std::result::Result<(), SendError> {
            self.record(Sent::Menu {
                to: recipient_id.to_string(),
                text: text.to_string(),
                replies: replies.to_vec(),
            })
            .await;
            Ok(())
        }

        async fn typing_on(&self, _recipient_id: &str) -> std::result::Result<(), SendError> {
            self.record(Sent::Typing).await;
            Ok(())
        }
    }

    fn dispatcher_for(server: &MockServer) -> (Dispatcher, Arc<RecordingSink>) {
        dispatcher_with_sink(server, Arc::new(RecordingSink::default()))
    }

    fn dispatcher_with_sink(
        server: &MockServer,
        sink: Arc<RecordingSink>,
    ) -> (Dispatcher, Arc<RecordingSink>) {
        let geocode = GeocodeClient::new(&GeocodeConfig {
            endpoint: server.uri(),
            api_key: None,
            timeout_secs: 5,
        })
        .unwrap();
        let dispatcher = Dispatcher::new(
            SessionStore::new(),
            geocode,
            sink.clone(),
            BotTexts::default(),
        );
        (dispatcher, sink)
    }

    fn text_event(sender: &str, text: &str) -> Event {
        Event::Text {
            sender_id: sender.into(),
            text: text.into(),
        }
    }

    fn location_event(sender: &str, lat: f64, lng: f64) -> Event {
        Event::Location {
            sender_id: sender.into(),
            lat,
            lng,
        }
    }

    fn postback_event(sender: &str, payload: PostbackPayload) -> Event {
        Event::Postback {
            sender_id: sender.into(),
            payload,
        }
    }

    fn place_body(lat: f64, lng: f64, address: &str) -> serde_json::Value {
        serde_json::json!({
            "status": "OK",
            "results": [{
                "geometry": { "location": { "lat": lat, "lng": lng } },
                "formatted_address": address
            }]
        })
    }

    fn zero_results() -> serde_json::Value {
        serde_json::json!({ "status": "ZERO_RESULTS", "results": [] })
    }

    #[test]
    fn intent_patterns_are_case_insensitive_and_ordered() {
        assert_eq!(classify_intent("COORD please"), Some(Command::ShowCoordinates));
        assert_eq!(classify_intent("need gps"), Some(Command::ShowCoordinates));
        assert_eq!(classify_intent("Full Address please"), Some(Command::ShowFullAddress));
        assert_eq!(classify_intent("my location"), Some(Command::LookupLocation));
        assert_eq!(classify_intent("hello there"), None);
        // "gps location" matches two patterns; the earlier one wins
        assert_eq!(classify_intent("gps location"), Some(Command::ShowCoordinates));
    }

    #[tokio::test]
    async fn first_event_sends_menu_exactly_once() {
        let server = MockServer::start().await;
        let (dispatcher, sink) = dispatcher_for(&server);

        dispatcher.handle_event(text_event("U1", "hello there")).await;

        assert_eq!(sink.menu_count(), 1);
        assert!(sink.texts().is_empty());
        let session = dispatcher.store().get("U1").unwrap();
        assert!(session.engaged);
        assert!(session.pending.is_none());

        // Second unrecognized message: no second menu, still no reply
        dispatcher.handle_event(text_event("U1", "hmm")).await;
        assert_eq!(sink.menu_count(), 1);
    }

    #[tokio::test]
    async fn batched_events_for_one_user_run_one_turn_at_a_time() {
        let server = MockServer::start().await;
        // Slow sends: without per-user ordering both tasks would read the
        // fresh session before either menu lands, and the user gets two
        let (dispatcher, sink) =
            dispatcher_with_sink(&server, Arc::new(RecordingSink::with_latency(50)));
        let dispatcher = Arc::new(dispatcher);

        let first = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.handle_event(text_event("U1", "hello")).await }
        });
        let second = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.handle_event(text_event("U1", "hi again")).await }
        });
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(sink.menu_count(), 1);
        let session = dispatcher.store().get("U1").unwrap();
        assert!(session.engaged);
        assert!(session.pending.is_none());
    }

    #[tokio::test]
    async fn different_users_are_not_serialized_against_each_other() {
        let server = MockServer::start().await;
        let (dispatcher, sink) =
            dispatcher_with_sink(&server, Arc::new(RecordingSink::with_latency(20)));
        let dispatcher = Arc::new(dispatcher);

        let mut handles = Vec::new();
        for user in ["U1", "U2", "U3", "U4"] {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.handle_event(text_event(user, "hello")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every user got exactly one menu; no cross-user lock starved anyone
        assert_eq!(sink.menu_count(), 4);
        for user in ["U1", "U2", "U3", "U4"] {
            assert!(dispatcher.store().get(user).unwrap().engaged);
        }
    }

    #[tokio::test]
    async fn text_intent_sets_pending_and_prompts_for_location() {
        let server = MockServer::start().await;
        let (dispatcher, sink) = dispatcher_for(&server);

        dispatcher
            .handle_event(text_event("U1", "full address please"))
            .await;

        let session = dispatcher.store().get("U1").unwrap();
        assert_eq!(session.pending, Some(Command::ShowFullAddress));

        // Menu first, then the location prompt
        let sent = sink.all();
        assert_eq!(sink.menu_count(), 1);
        assert_eq!(
            sent.last().unwrap(),
            &Sent::Menu {
                to: "U1".into(),
                text: "Type in any destination or send us your location:".into(),
                replies: vec![QuickReply::Location],
            }
        );
    }

    #[tokio::test]
    async fn full_address_scenario_completes_with_reverse_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("latlng", "51.5,-0.12"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(place_body(51.5, -0.12, "Westminster, London, UK")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, sink) = dispatcher_for(&server);

        dispatcher
            .handle_event(text_event("U1", "full address please"))
            .await;
        dispatcher
            .handle_event(location_event("U1", 51.5, -0.12))
            .await;

        let texts = sink.texts();
        let reply = texts.last().unwrap();
        assert!(reply.contains("Westminster, London, UK"));
        assert!(reply.contains("Latitude 51.5"));

        let session = dispatcher.store().get("U1").unwrap();
        assert!(session.pending.is_none());
        assert!(!session.engaged);
    }

    #[tokio::test]
    async fn forward_lookup_success_replies_with_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("address", "10 Downing Street"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(place_body(51.5034, -0.1276, "10 Downing St")),
            )
            .mount(&server)
            .await;

        let (dispatcher, sink) = dispatcher_for(&server);
        dispatcher.store().update("U2", |s| {
            s.engaged = true;
            s.pending = Some(Command::ShowCoordinates);
        });

        dispatcher
            .handle_event(text_event("U2", "10 Downing Street"))
            .await;

        assert_eq!(
            sink.texts(),
            vec!["Latitude: 51.5034 / Longitude: -0.1276".to_string()]
        );
    }

    #[tokio::test]
    async fn not_found_retries_once_then_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zero_results()))
            .expect(2)
            .mount(&server)
            .await;

        let (dispatcher, sink) = dispatcher_for(&server);
        dispatcher.store().update("U2", |s| {
            s.engaged = true;
            s.pending = Some(Command::ShowCoordinates);
        });

        dispatcher
            .handle_event(text_event("U2", "123 Nowhere St"))
            .await;

        let texts = sink.texts();
        assert_eq!(texts.len(), 2);
        assert_eq!(
            texts[0],
            "There were no results. Type your destination again, please"
        );
        assert!(texts[1].contains("Still no results"));

        let session = dispatcher.store().get("U2").unwrap();
        assert!(session.pending.is_none());
        assert!(!session.engaged);
    }

    #[tokio::test]
    async fn unsupported_attachment_gets_fooling_reply_without_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zero_results()))
            .expect(0)
            .mount(&server)
            .await;

        let (dispatcher, sink) = dispatcher_for(&server);
        dispatcher.store().update("U2", |s| {
            s.engaged = true;
            s.pending = Some(Command::ShowFullAddress);
        });

        dispatcher
            .handle_event(Event::Unsupported {
                sender_id: "U2".into(),
            })
            .await;

        assert_eq!(
            sink.texts(),
            vec!["Why are you trying to fool me, human?".to_string()]
        );
    }

    #[tokio::test]
    async fn location_postback_without_location_asks_to_resend() {
        let server = MockServer::start().await;
        let (dispatcher, sink) = dispatcher_for(&server);

        dispatcher
            .handle_event(postback_event("U3", PostbackPayload::Location))
            .await;

        // Fresh session: menu first, then the resend prompt; nothing pending
        assert_eq!(sink.menu_count(), 1);
        assert_eq!(
            sink.texts(),
            vec!["Please try your request again and use 'Send location' button".to_string()]
        );
        assert!(dispatcher.store().get("U3").unwrap().pending.is_none());
    }

    #[tokio::test]
    async fn coordinates_postback_sets_pending_command() {
        let server = MockServer::start().await;
        let (dispatcher, sink) = dispatcher_for(&server);
        dispatcher.store().update("U4", |s| s.engaged = true);

        dispatcher
            .handle_event(postback_event("U4", PostbackPayload::Coordinates))
            .await;

        assert_eq!(
            dispatcher.store().get("U4").unwrap().pending,
            Some(Command::ShowCoordinates)
        );
        assert_eq!(sink.menu_count(), 0);
    }

    #[tokio::test]
    async fn start_postback_reprompts_menu() {
        let server = MockServer::start().await;
        let (dispatcher, sink) = dispatcher_for(&server);
        dispatcher.store().update("U5", |s| s.engaged = true);

        dispatcher
            .handle_event(postback_event("U5", PostbackPayload::Start))
            .await;

        assert_eq!(sink.menu_count(), 1);
        assert!(dispatcher.store().get("U5").unwrap().pending.is_none());
    }

    #[tokio::test]
    async fn provider_error_folds_into_failure_reply() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, sink) = dispatcher_for(&server);
        dispatcher.store().update("U6", |s| {
            s.engaged = true;
            s.pending = Some(Command::ShowCoordinates);
        });

        dispatcher.handle_event(text_event("U6", "somewhere")).await;

        let texts = sink.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("something went wrong"));

        // The turn still completes
        let session = dispatcher.store().get("U6").unwrap();
        assert!(session.pending.is_none());
    }

    #[tokio::test]
    async fn reverse_miss_renders_placeholder_address() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zero_results()))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, sink) = dispatcher_for(&server);
        dispatcher.store().update("U7", |s| {
            s.engaged = true;
            s.pending = Some(Command::LookupLocation);
        });

        dispatcher
            .handle_event(location_event("U7", 40.0, -74.0))
            .await;

        let texts = sink.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("an address I can't name"));
        assert!(texts[0].contains("Latitude 40"));
    }

    #[tokio::test]
    async fn menu_lists_the_three_lookup_options() {
        let server = MockServer::start().await;
        let (dispatcher, sink) = dispatcher_for(&server);

        dispatcher.handle_event(text_event("U8", "hi")).await;

        let Sent::Menu { replies, .. } = sink.all().remove(0) else {
            panic!("expected menu");
        };
        assert_eq!(
            replies,
            vec![
                QuickReply::text("GPS for address", "COORDINATES"),
                QuickReply::text("Full address", "FULL_ADDRESS"),
                QuickReply::text("My location", "LOCATION"),
            ]
        );
    }
}
