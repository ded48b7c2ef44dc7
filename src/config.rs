use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

/// One menu button: the caption shown on the keyboard, extra keywords that
/// also trigger it, and the canned reply.
#[derive(Debug, Clone, Deserialize)]
pub struct MenuEntry {
    pub caption: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub reply: String,
}

/// User-facing reply templates. All overridable from the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Texts {
    pub greeting: String,
    pub reply_throttled: String,
    pub reply_forwarded: String,
    pub reply_not_found: String,
    pub reply_lookup_failed: String,
    pub reply_access_denied: String,
    pub reply_no_messages: String,
    pub usage_vinstatus: String,
    pub usage_reply: String,
    pub unknown_marker: String,
}

impl Default for Texts {
    fn default() -> Self {
        Self {
            greeting: "Привіт! Вас вітає підтримка. Оберіть одне з частих питань або напишіть своє."
                .to_string(),
            reply_throttled: "⏳ Забагато повідомлень. Зачекайте хвилину і спробуйте ще раз."
                .to_string(),
            reply_forwarded: "✅ Повідомлення надіслано менеджеру. Очікуйте відповідь.".to_string(),
            reply_not_found:
                "❌ Інформації за цим VIN-кодом не знайдено. Перевірте код або напишіть менеджеру."
                    .to_string(),
            reply_lookup_failed: "⚠️ Не вдалося отримати статус. Спробуйте пізніше.".to_string(),
            reply_access_denied: "❌ У вас немає доступу до цієї команди.".to_string(),
            reply_no_messages: "❌ Немає повідомлень в історії.".to_string(),
            usage_vinstatus: "⚠️ Формат: /vinstatus <VIN> <контейнер> <статус>".to_string(),
            usage_reply: "⚠️ Формат: /reply <user_id> <текст>".to_string(),
            unknown_marker: "невідомо".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// The single privileged identity: receives relays, may issue
    /// management commands.
    operator_id: i64,
    #[serde(default = "default_rate_limit_max_events")]
    rate_limit_max_events: usize,
    #[serde(default = "default_rate_limit_window_secs")]
    rate_limit_window_secs: u64,
    /// Whether a menu-matched message is also archived and relayed to the
    /// operator. The canned menu reply stays the only reply to the sender.
    #[serde(default)]
    relay_menu_matches: bool,
    /// Base URL of the remote vehicle-tracking service. Unset = store-only.
    tracker_endpoint: Option<String>,
    #[serde(default)]
    tracker_api_token: String,
    /// Directory for state files (store, logs). Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_menu")]
    menu: Vec<MenuEntry>,
    #[serde(default)]
    texts: Texts,
}

fn default_rate_limit_max_events() -> usize {
    5
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

pub(crate) fn default_menu() -> Vec<MenuEntry> {
    let entry = |caption: &str, keywords: &[&str], reply: &str| MenuEntry {
        caption: caption.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        reply: reply.to_string(),
    };
    vec![
        entry(
            "🚗 Де авто?",
            &["де авто", "статус доставки"],
            "🚗 Щоб дізнатись статус доставки, надішліть VIN-код (17 символів).\nМи перевіримо і повідомимо вам найближчим часом.",
        ),
        entry(
            "📥 Хочу авто зі США",
            &["хочу авто", "пригін авто"],
            "👋 Щоб розпочати процес доставки авто, заповніть форму: https://forms.gle/BXkuZr9C5qEJHijd7\n\n❗️Обов'язково прогляньте наш договір перед тим як заповнювати анкету!\n📄 Договір: https://docs.google.com/document/d/1VSmsVevCBc0BCSVnsJgdkwlZRWDY_hhjIbcnzPpsOVg/edit?usp=sharing",
        ),
        entry(
            "📞 Контакт",
            &["контакт", "телефон"],
            "📞 Наш менеджер зателефонує найближчим часом. Телефон: +380XXXXXXXXX",
        ),
        entry(
            "📋 В наявності",
            &["в наявності", "які авто"],
            "📋 Актуальний список авто надішле менеджер. Напишіть, яка марка вас цікавить.",
        ),
        entry(
            "❓FAQ",
            &["faq", "питання"],
            "❓ Найчастіше питають: «Де моє авто?» — натисніть кнопку «🚗 Де авто?» і надішліть VIN-код.",
        ),
    ]
}

pub struct Config {
    pub telegram_bot_token: String,
    pub operator_id: i64,
    pub rate_limit_max_events: usize,
    pub rate_limit_window: Duration,
    pub relay_menu_matches: bool,
    pub tracker_endpoint: Option<String>,
    pub tracker_api_token: String,
    /// Directory for state files (store, logs).
    pub data_dir: PathBuf,
    pub menu: Vec<MenuEntry>,
    pub texts: Texts,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }
        if file.operator_id <= 0 {
            return Err(ConfigError::Validation("operator_id must be a positive user id".into()));
        }
        if file.rate_limit_max_events == 0 {
            return Err(ConfigError::Validation("rate_limit_max_events must be at least 1".into()));
        }
        if file.tracker_endpoint.is_some() && file.tracker_api_token.is_empty() {
            return Err(ConfigError::Validation(
                "tracker_api_token is required when tracker_endpoint is set".into(),
            ));
        }
        if file.menu.is_empty() {
            return Err(ConfigError::Validation("menu must contain at least one entry".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            operator_id: file.operator_id,
            rate_limit_max_events: file.rate_limit_max_events,
            rate_limit_window: Duration::from_secs(file.rate_limit_window_secs),
            relay_menu_matches: file.relay_menu_matches,
            tracker_endpoint: file.tracker_endpoint,
            tracker_api_token: file.tracker_api_token,
            data_dir,
            menu: file.menu,
            texts: file.texts,
        })
    }

    pub fn is_operator(&self, user_id: i64) -> bool {
        self.operator_id == user_id
    }

    /// Keyboard captions in menu order.
    pub fn menu_captions(&self) -> Vec<String> {
        self.menu.iter().map(|e| e.caption.clone()).collect()
    }
}
