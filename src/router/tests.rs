//! End-to-end router scenarios against an in-memory store and a mock
//! transport.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::{Config, Texts, default_menu};
use crate::router::engine::Engine;
use crate::router::event::InboundEvent;
use crate::router::outbound::mock::MockTransport;
use crate::router::rate_limit::RateLimiter;
use crate::router::resolver::StatusResolver;
use crate::router::store::Store;
use crate::router::tracker::mock::MockTracker;
use crate::router::tracker::TrackedVehicle;

const OPERATOR: i64 = 42;
const USER: i64 = 100;

fn test_config() -> Config {
    Config {
        telegram_bot_token: String::new(),
        operator_id: OPERATOR,
        rate_limit_max_events: 5,
        rate_limit_window: Duration::from_secs(60),
        relay_menu_matches: false,
        tracker_endpoint: None,
        tracker_api_token: String::new(),
        data_dir: ".".into(),
        menu: default_menu(),
        texts: Texts::default(),
    }
}

struct Harness {
    engine: Engine<MockTransport>,
    store: Arc<Store>,
    transport: Arc<MockTransport>,
    config: Arc<Config>,
}

fn harness(config: Config) -> Harness {
    let config = Arc::new(config);
    let store = Arc::new(Store::in_memory());
    let transport = Arc::new(MockTransport::new());
    let resolver =
        StatusResolver::new(store.clone(), None, config.texts.unknown_marker.clone());
    let rate = RateLimiter::new(config.rate_limit_max_events, config.rate_limit_window);
    let engine = Engine::new(
        config.clone(),
        store.clone(),
        rate,
        resolver,
        transport.clone(),
    );
    Harness { engine, store, transport, config }
}

fn event(user_id: i64, text: &str) -> InboundEvent {
    InboundEvent {
        user_id,
        username: Some("tester".to_string()),
        text: text.to_string(),
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_vin_lookup_miss_replies_not_found() {
    let h = harness(test_config());
    h.engine.handle_event(event(USER, "WBAVA37503ABCD123")).await;

    let sent = h.transport.sent_to(USER);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, h.config.texts.reply_not_found);
    // A lookup is terminal: nothing archived, nothing relayed.
    assert_eq!(h.store.message_count(), 0);
    assert!(h.transport.sent_to(OPERATOR).is_empty());
}

#[tokio::test]
async fn test_vinstatus_then_lookup_renders_card() {
    let h = harness(test_config());
    h.engine
        .handle_event(event(OPERATOR, "/vinstatus wbava37503abcd123 CNT99 Kyiv | Warsaw"))
        .await;

    let confirmations = h.transport.sent_to(OPERATOR);
    assert_eq!(confirmations.len(), 1);
    assert!(confirmations[0].text.contains("WBAVA37503ABCD123"));
    assert!(confirmations[0].text.contains("CNT99"));

    h.engine.handle_event(event(USER, "WBAVA37503ABCD123")).await;
    let sent = h.transport.sent_to(USER);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].markdown);
    assert!(sent[0].text.contains("Kyiv"));
    assert!(sent[0].text.contains("Warsaw"));
}

fn tracked_harness(tracker: MockTracker) -> (Engine<MockTransport, MockTracker>, Arc<MockTransport>, Arc<Config>) {
    let config = Arc::new(test_config());
    let store = Arc::new(Store::in_memory());
    let transport = Arc::new(MockTransport::new());
    let resolver =
        StatusResolver::new(store.clone(), Some(tracker), config.texts.unknown_marker.clone());
    let rate = RateLimiter::new(config.rate_limit_max_events, config.rate_limit_window);
    let engine = Engine::new(config.clone(), store, rate, resolver, transport.clone());
    (engine, transport, config)
}

#[tokio::test]
async fn test_tracker_failure_replies_lookup_failed() {
    let (engine, transport, config) = tracked_harness(MockTracker::failing("connection refused"));
    engine.handle_event(event(USER, "WBAVA37503ABCD123")).await;

    // A broken backend is reported as a failure, never as a miss.
    let sent = transport.sent_to(USER);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, config.texts.reply_lookup_failed);
    assert_ne!(sent[0].text, config.texts.reply_not_found);
}

#[tokio::test]
async fn test_tracker_hit_renders_card() {
    let tracker = MockTracker::new().with_record(
        "WBAVA37503ABCD123",
        TrackedVehicle {
            make: Some("BMW".to_string()),
            current_location: Some("Klaipeda".to_string()),
            ..Default::default()
        },
    );
    let (engine, transport, config) = tracked_harness(tracker);
    engine.handle_event(event(USER, "WBAVA37503ABCD123")).await;

    let sent = transport.sent_to(USER);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].markdown);
    assert!(sent[0].text.contains("Klaipeda"));
    assert!(sent[0].text.contains(&config.texts.unknown_marker));
}

#[tokio::test]
async fn test_sixth_event_in_window_is_throttled() {
    let h = harness(test_config());
    for _ in 0..5 {
        h.engine.handle_event(event(USER, "/start")).await;
    }
    h.engine.handle_event(event(USER, "/start")).await;

    let sent = h.transport.sent_to(USER);
    assert_eq!(sent.len(), 6);
    assert!(sent[..5].iter().all(|m| m.with_menu));
    assert_eq!(sent[5].text, h.config.texts.reply_throttled);
}

#[tokio::test]
async fn test_fallback_archives_relays_and_acks() {
    let h = harness(test_config());
    h.engine.handle_event(event(USER, "Скільки коштує доставка?")).await;

    assert_eq!(h.store.message_count(), 1);

    let relayed = h.transport.sent_to(OPERATOR);
    assert_eq!(relayed.len(), 1);
    assert!(relayed[0].text.contains("✉️ Повідомлення від @tester"));
    assert!(relayed[0].text.contains("Скільки коштує доставка?"));

    let acks = h.transport.sent_to(USER);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].text, h.config.texts.reply_forwarded);
}

#[tokio::test]
async fn test_relay_failure_still_acks_sender() {
    let h = harness(test_config());
    h.transport.fail_for(OPERATOR);
    h.engine.handle_event(event(USER, "hello there")).await;

    assert_eq!(h.store.message_count(), 1);
    let acks = h.transport.sent_to(USER);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].text, h.config.texts.reply_forwarded);
}

#[tokio::test]
async fn test_denied_command_changes_no_state() {
    let h = harness(test_config());
    h.engine
        .handle_event(event(USER, "/vinstatus WBAVA37503ABCD123 CNT99 Kyiv"))
        .await;

    let sent = h.transport.sent_to(USER);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, h.config.texts.reply_access_denied);
    assert!(h.transport.sent_to(OPERATOR).is_empty());
    assert!(
        h.store
            .get_vehicle_status("WBAVA37503ABCD123")
            .is_ok_and(|r| r.is_none())
    );
}

#[tokio::test]
async fn test_menu_match_is_terminal_by_default() {
    let h = harness(test_config());
    h.engine.handle_event(event(USER, "де авто сейчас")).await;

    let sent = h.transport.sent_to(USER);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, h.config.menu[0].reply);
    assert_eq!(h.store.message_count(), 0);
    assert!(h.transport.sent_to(OPERATOR).is_empty());
}

#[tokio::test]
async fn test_menu_match_relayed_when_policy_enabled() {
    let mut config = test_config();
    config.relay_menu_matches = true;
    let h = harness(config);
    h.engine.handle_event(event(USER, "де авто")).await;

    // Archived and relayed, but still exactly one reply to the sender.
    assert_eq!(h.store.message_count(), 1);
    assert_eq!(h.transport.sent_to(OPERATOR).len(), 1);
    let sent = h.transport.sent_to(USER);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, h.config.menu[0].reply);
}

#[tokio::test]
async fn test_operator_free_text_is_dropped() {
    let h = harness(test_config());
    h.engine.handle_event(event(OPERATOR, "note to self")).await;

    assert!(h.transport.sent().is_empty());
    assert_eq!(h.store.message_count(), 0);
}

#[tokio::test]
async fn test_start_sends_menu_keyboard() {
    let h = harness(test_config());
    h.engine.handle_event(event(USER, "/start")).await;

    let sent = h.transport.sent_to(USER);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].with_menu);
    assert_eq!(sent[0].text, h.config.texts.greeting);
}

#[tokio::test]
async fn test_direct_reply_reaches_target_and_confirms() {
    let h = harness(test_config());
    h.engine.handle_event(event(OPERATOR, "/reply 100 Добрий день!")).await;

    let delivered = h.transport.sent_to(USER);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].text, "📩 Відповідь від менеджера:\nДобрий день!");

    let confirmations = h.transport.sent_to(OPERATOR);
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].text, "✅ Повідомлення надіслано.");
}

#[tokio::test]
async fn test_direct_reply_failure_reported_to_operator() {
    let h = harness(test_config());
    h.transport.fail_for(USER);
    h.engine.handle_event(event(OPERATOR, "/reply 100 Добрий день!")).await;

    let confirmations = h.transport.sent_to(OPERATOR);
    assert_eq!(confirmations.len(), 1);
    assert!(confirmations[0].text.starts_with("⚠️ Не вдалося надіслати"));
}

#[tokio::test]
async fn test_messages_lists_newest_first() {
    let h = harness(test_config());
    h.engine.handle_event(event(USER, "first question")).await;
    h.engine.handle_event(event(USER, "second question")).await;
    h.engine.handle_event(event(OPERATOR, "/messages")).await;

    // Two relays plus the listing.
    let to_operator = h.transport.sent_to(OPERATOR);
    let listing = &to_operator.last().expect("listing sent").text;
    let first = listing.find("first question").unwrap();
    let second = listing.find("second question").unwrap();
    assert!(second < first);
}

#[tokio::test]
async fn test_messages_empty_history() {
    let h = harness(test_config());
    h.engine.handle_event(event(OPERATOR, "/messages")).await;

    let sent = h.transport.sent_to(OPERATOR);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, h.config.texts.reply_no_messages);
}

#[tokio::test]
async fn test_messages_listing_capped_at_telegram_limit() {
    let h = harness(test_config());
    // Cyrillic text: the cap is 4096 characters even at two bytes each.
    let long = "й".repeat(1500);
    for _ in 0..4 {
        h.engine.handle_event(event(USER, &long)).await;
    }
    h.engine.handle_event(event(OPERATOR, "/messages")).await;

    let to_operator = h.transport.sent_to(OPERATOR);
    let listing = &to_operator.last().expect("listing sent").text;
    assert_eq!(listing.chars().count(), 4096);
}

#[tokio::test]
async fn test_malformed_operator_command_gets_usage() {
    let h = harness(test_config());
    h.engine.handle_event(event(OPERATOR, "/vinstatus TOOSHORT")).await;

    let sent = h.transport.sent_to(OPERATOR);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, h.config.texts.usage_vinstatus);
}

#[tokio::test]
async fn test_inbound_event_updates_user_profile() {
    let h = harness(test_config());
    h.engine.handle_event(event(USER, "/start")).await;
    h.engine.handle_event(event(USER, "hello")).await;

    assert_eq!(h.store.user_message_count(USER), 2);
}
