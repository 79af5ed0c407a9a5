//! Telegram channel
//!
//! `POST https://api.telegram.org/bot{token}/sendMessage` with a plain-text body.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};

use super::Notifier;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Serialize, PartialEq)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    /// `None` unless both token and chat id are non-empty.
    pub fn new(bot_token: &str, chat_id: &str, timeout: Duration) -> Option<Self> {
        if bot_token.trim().is_empty() || chat_id.trim().is_empty() {
            return None;
        }
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to build Telegram client: {}", e);
                return None;
            }
        };
        Some(Self {
            bot_token: bot_token.trim().to_string(),
            chat_id: chat_id.trim().to_string(),
            base_url: TELEGRAM_API.to_string(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.bot_token)
    }

    fn payload<'a>(&'a self, text: &'a str) -> SendMessage<'a> {
        SendMessage {
            chat_id: &self.chat_id,
            text,
            disable_web_page_preview: true,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, text: &str) -> bool {
        match self.client.post(self.endpoint()).json(&self.payload(text)).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Telegram sendMessage returned status: {}", response.status());
                false
            }
            Err(e) => {
                // reqwest errors embed the URL, which carries the bot token
                error!("Failed to send Telegram message: {}", e.without_url());
                false
            }
        }
    }
}
