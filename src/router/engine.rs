//! Event classifier and router.
//!
//! Ordered-predicate dispatch over one inbound event, first match wins:
//! throttle gate, VIN lookup, slash commands, menu keywords, fallback
//! relay. Each event produces at most one final reply to the sender;
//! archiving and relay are side effects that never add a second reply.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::menu;
use crate::router::event::InboundEvent;
use crate::router::outbound::Transport;
use crate::router::rate_limit::RateLimiter;
use crate::router::resolver::{Resolution, StatusCard, StatusResolver};
use crate::router::store::Store;
use crate::router::tracker::{Tracker, TrackerClient};
use crate::vin;

/// Telegram caps outbound messages at 4096 characters, not bytes.
const MAX_MESSAGE_CHARS: usize = 4096;

/// How many archived messages `/messages` renders.
const RECENT_MESSAGES_LIMIT: usize = 10;

/// Operator commands that passed argument validation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    UpdateStatus {
        vin: String,
        reference: String,
        status_text: String,
    },
    ListMessages,
    DirectReply { target: i64, text: String },
}

/// What the router decided to do with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Category {
    /// Text has the VIN shape; carries the normalized identifier.
    VinLookup(String),
    /// `/start` from any identity: re-issue the menu.
    Start,
    Operator(OperatorCommand),
    /// Operator command with malformed arguments; carries the usage reply.
    Invalid(String),
    /// Privileged command from a non-operator identity.
    AccessDenied,
    /// Menu entry index.
    Menu(usize),
    /// Operator free text matching nothing; dropped without reply.
    Silence,
    /// Archive, relay to the operator, acknowledge the sender.
    Fallback,
}

/// Classify one admitted event. Pure: all state checks (throttling)
/// happen before this is called.
pub fn classify(config: &Config, user_id: i64, text: &str) -> Category {
    let trimmed = text.trim();

    if let Some(vin) = vin::normalize(trimmed) {
        return Category::VinLookup(vin);
    }

    let is_operator = config.is_operator(user_id);
    let first_token = trimmed.split_whitespace().next().unwrap_or("");
    // Telegram clients may append the bot mention: "/start@somebot".
    let command = if first_token.starts_with('/') {
        first_token.split_once('@').map_or(first_token, |(cmd, _)| cmd)
    } else {
        first_token
    };

    match command {
        "/start" => return Category::Start,
        "/vinstatus" | "/messages" | "/reply" => {
            if !is_operator {
                return Category::AccessDenied;
            }
            return parse_operator_command(config, command, trimmed);
        }
        _ => {}
    }

    if let Some(i) = menu::match_menu(trimmed, &config.menu) {
        return Category::Menu(i);
    }

    if is_operator {
        return Category::Silence;
    }
    Category::Fallback
}

fn parse_operator_command(config: &Config, command: &str, text: &str) -> Category {
    let args: Vec<&str> = text.split_whitespace().skip(1).collect();

    match command {
        "/messages" => Category::Operator(OperatorCommand::ListMessages),
        "/vinstatus" => {
            // <vin> <reference> <status...>, status may contain spaces
            if args.len() < 3 {
                return Category::Invalid(config.texts.usage_vinstatus.clone());
            }
            let Some(vin) = vin::normalize(args[0]) else {
                return Category::Invalid(config.texts.usage_vinstatus.clone());
            };
            Category::Operator(OperatorCommand::UpdateStatus {
                vin,
                reference: args[1].to_string(),
                status_text: args[2..].join(" "),
            })
        }
        "/reply" => {
            if args.len() < 2 {
                return Category::Invalid(config.texts.usage_reply.clone());
            }
            let Ok(target) = args[0].parse::<i64>() else {
                return Category::Invalid(config.texts.usage_reply.clone());
            };
            Category::Operator(OperatorCommand::DirectReply {
                target,
                text: args[1..].join(" "),
            })
        }
        _ => Category::Fallback,
    }
}

/// The routing engine. One instance per process; each inbound event is
/// handled as an independent task.
pub struct Engine<T: Transport, K: Tracker = TrackerClient> {
    config: Arc<Config>,
    store: Arc<Store>,
    rate: RateLimiter,
    resolver: StatusResolver<K>,
    transport: Arc<T>,
}

impl<T: Transport, K: Tracker> Engine<T, K> {
    pub fn new(
        config: Arc<Config>,
        store: Arc<Store>,
        rate: RateLimiter,
        resolver: StatusResolver<K>,
        transport: Arc<T>,
    ) -> Self {
        Self { config, store, rate, resolver, transport }
    }

    /// Handle one inbound event end to end.
    pub async fn handle_event(&self, event: InboundEvent) {
        let preview: String = event.text.chars().take(50).collect();
        info!("📨 {} ({}): \"{}\"", event.display_name(), event.user_id, preview);

        let timestamp = event.timestamp_str();
        // Profile rows are refreshed for every inbound event, throttled or not.
        self.store.upsert_user(event.user_id, event.username.as_deref(), &timestamp);

        if !self.rate.admit(event.user_id, Instant::now()) {
            debug!("Throttled user {}", event.user_id);
            self.reply(event.user_id, &self.config.texts.reply_throttled).await;
            return;
        }

        match classify(&self.config, event.user_id, &event.text) {
            Category::VinLookup(vin) => self.handle_vin_lookup(event.user_id, &vin).await,
            Category::Start => {
                if let Err(e) = self
                    .transport
                    .send_menu(event.user_id, &self.config.texts.greeting, &self.config.menu_captions())
                    .await
                {
                    warn!("Failed to send menu to {}: {e}", event.user_id);
                }
            }
            Category::Operator(command) => self.handle_operator(command, &timestamp).await,
            Category::Invalid(usage) => self.reply(self.config.operator_id, &usage).await,
            Category::AccessDenied => {
                info!("Denied privileged command from {}", event.user_id);
                self.reply(event.user_id, &self.config.texts.reply_access_denied).await;
            }
            Category::Menu(i) => self.handle_menu(&event, i, &timestamp).await,
            Category::Silence => debug!("Dropping operator free text"),
            Category::Fallback => self.handle_fallback(&event, &timestamp).await,
        }
    }

    async fn handle_vin_lookup(&self, user_id: i64, vin: &str) {
        match self.resolver.resolve(vin).await {
            Resolution::Found(card) => {
                if let Err(e) = self.transport.send(user_id, &render_card(&card), true).await {
                    warn!("Failed to send status card to {user_id}: {e}");
                }
            }
            Resolution::NotFound => {
                info!("No status for {vin}");
                self.reply(user_id, &self.config.texts.reply_not_found).await;
            }
            // The resolver already logged the cause at error level.
            Resolution::Failed(_) => {
                self.reply(user_id, &self.config.texts.reply_lookup_failed).await;
            }
        }
    }

    async fn handle_menu(&self, event: &InboundEvent, index: usize, timestamp: &str) {
        if self.config.relay_menu_matches && !self.config.is_operator(event.user_id) {
            // Policy: menu taps are also archived and relayed, but the
            // canned reply below stays the only reply to the sender.
            self.archive(event, timestamp);
            self.relay(event).await;
        }
        self.reply(event.user_id, &self.config.menu[index].reply).await;
    }

    /// Fallback: archive, relay to the operator, acknowledge the sender.
    /// The three effects are independent; any one may fail without
    /// cancelling the others.
    async fn handle_fallback(&self, event: &InboundEvent, timestamp: &str) {
        self.archive(event, timestamp);
        self.relay(event).await;
        self.reply(event.user_id, &self.config.texts.reply_forwarded).await;
    }

    fn archive(&self, event: &InboundEvent, timestamp: &str) {
        if let Err(e) =
            self.store.append_message(event.user_id, event.display_name(), &event.text, timestamp)
        {
            warn!("{e}");
        }
    }

    async fn relay(&self, event: &InboundEvent) {
        let relay = format!(
            "✉️ Повідомлення від @{} (ID: {}):\n{}",
            event.display_name(),
            event.user_id,
            event.text
        );
        if let Err(e) = self.transport.send(self.config.operator_id, &relay, false).await {
            error!("Relay to operator failed: {e}");
        }
    }

    async fn handle_operator(&self, command: OperatorCommand, timestamp: &str) {
        let operator = self.config.operator_id;
        match command {
            OperatorCommand::UpdateStatus { vin, reference, status_text } => {
                match self.store.upsert_vehicle_status(&vin, &status_text, Some(&reference), timestamp) {
                    Ok(record) => {
                        info!("Status updated for {}", record.vin);
                        let confirmation = format!(
                            "✅ Статус оновлено:\nVIN: {}\nКонтейнер: {}\nСтатус: {}",
                            record.vin,
                            record.reference.as_deref().unwrap_or("—"),
                            record.status_text
                        );
                        self.reply(operator, &confirmation).await;
                    }
                    Err(e) => {
                        error!("{e}");
                        self.reply(operator, &format!("⚠️ Не вдалося зберегти статус: {e}")).await;
                    }
                }
            }
            OperatorCommand::ListMessages => match self.store.recent_messages(RECENT_MESSAGES_LIMIT) {
                Ok(messages) if messages.is_empty() => {
                    self.reply(operator, &self.config.texts.reply_no_messages).await;
                }
                Ok(messages) => {
                    let mut out = String::from("📝 Останні повідомлення:\n\n");
                    for m in &messages {
                        out.push_str(&format!(
                            "🕒 {} — @{} ({}):\n{}\n\n",
                            m.timestamp, m.username, m.user_id, m.text
                        ));
                    }
                    self.reply(operator, truncate_chars(&out, MAX_MESSAGE_CHARS)).await;
                }
                Err(e) => {
                    error!("{e}");
                    self.reply(operator, &self.config.texts.reply_lookup_failed).await;
                }
            },
            OperatorCommand::DirectReply { target, text } => {
                let tagged = format!("📩 Відповідь від менеджера:\n{text}");
                match self.transport.send(target, &tagged, false).await {
                    Ok(_) => self.reply(operator, "✅ Повідомлення надіслано.").await,
                    Err(e) => {
                        warn!("Direct reply to {target} failed: {e}");
                        self.reply(operator, &format!("⚠️ Не вдалося надіслати повідомлення: {e}"))
                            .await;
                    }
                }
            }
        }
    }

    /// Plain-text reply; a send failure is logged, never propagated.
    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.transport.send(chat_id, text, false).await {
            warn!("Failed to reply to {chat_id}: {e}");
        }
    }
}

/// Render a status card as Markdown.
fn render_card(card: &StatusCard) -> String {
    let mut out = format!(
        "🚗 *Статус авто*\nVIN: `{}`\n📍 Остання локація: {}\n➡️ Наступна локація: {}",
        card.vin, card.last_location, card.next_location
    );
    if let Some(ref reference) = card.reference {
        out.push_str(&format!("\n📦 Контейнер: {reference}"));
    }
    if card.make.is_some() || card.model.is_some() {
        out.push_str(&format!(
            "\n🏭 Авто: {} {}",
            card.make.as_deref().unwrap_or(""),
            card.model.as_deref().unwrap_or("")
        ));
    }
    if let Some(ref departure) = card.departure {
        out.push_str(&format!("\n🛳 Відправлення: {departure}"));
    }
    if let Some(ref arrival) = card.arrival {
        out.push_str(&format!("\n🛬 Очікуване прибуття: {arrival}"));
    }
    if let Some(ref updated) = card.updated_at {
        out.push_str(&format!("\n🕒 Оновлено: {updated}"));
    }
    out
}

/// Truncate to at most `max_chars` characters.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
