mod config;
mod menu;
mod router;
mod vin;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tracing::info;
use tracing_subscriber::prelude::*;

use config::Config;
use router::{Engine, InboundEvent, RateLimiter, StatusResolver, Store, TelegramClient, TrackerClient};

type BotEngine = Engine<TelegramClient>;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "motorbot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("motorbot.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting motorbot...");
    info!("Loaded config from {config_path}");
    info!("Operator ID: {}", config.operator_id);

    std::fs::create_dir_all(&config.data_dir).ok();
    let store = match Store::open(&config.data_dir.join("motorbot.db")) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Store error: {e}");
            std::process::exit(1);
        }
    };

    let tracker = config
        .tracker_endpoint
        .clone()
        .map(|endpoint| TrackerClient::new(endpoint, config.tracker_api_token.clone()));
    if tracker.is_some() {
        info!("Remote tracker enabled");
    } else {
        info!("Remote tracker disabled (local store only)");
    }

    let bot = Bot::new(&config.telegram_bot_token);
    let config = Arc::new(config);

    let resolver = StatusResolver::new(store.clone(), tracker, config.texts.unknown_marker.clone());
    let rate = RateLimiter::new(config.rate_limit_max_events, config.rate_limit_window);
    let transport = Arc::new(TelegramClient::new(bot.clone()));
    let engine = Arc::new(Engine::new(config, store, rate, resolver, transport));

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, engine: Arc<BotEngine>) -> ResponseResult<()> {
    // Private chats only; the bot has no group behavior.
    if !matches!(msg.chat.kind, ChatKind::Private(_)) {
        return Ok(());
    }
    let Some(ref user) = msg.from else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let event = InboundEvent {
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        text: text.to_string(),
        timestamp: msg.date,
    };
    engine.handle_event(event).await;
    Ok(())
}
