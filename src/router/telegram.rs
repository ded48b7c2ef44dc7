//! Telegram transport built on teloxide.

use teloxide::prelude::*;
use teloxide::types::{ChatId, KeyboardButton, KeyboardMarkup, ParseMode};
use tracing::warn;

use crate::router::outbound::Transport;

pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Two captions per keyboard row, like the original menu layout.
    fn keyboard(captions: &[String]) -> KeyboardMarkup {
        let rows: Vec<Vec<KeyboardButton>> = captions
            .chunks(2)
            .map(|row| row.iter().map(KeyboardButton::new).collect())
            .collect();
        KeyboardMarkup::new(rows).resize_keyboard()
    }
}

impl Transport for TelegramClient {
    async fn send(&self, chat_id: i64, text: &str, markdown: bool) -> Result<i64, String> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if markdown {
            request = request.parse_mode(ParseMode::Markdown);
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn send_menu(&self, chat_id: i64, text: &str, captions: &[String]) -> Result<i64, String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(Self::keyboard(captions))
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send menu: {e}");
                warn!("{}", msg);
                msg
            })
    }
}
