//! Discord channel
//!
//! Webhook POST with a single embed. The first line of the text becomes the
//! embed title, the rest the description; the colour follows the alert kind.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};

use super::format::{ARB_TAG, DEPEG_TAG, HEARTBEAT_TAG};
use super::Notifier;

/// Discord caps embed descriptions at 4096 characters
const MAX_DESCRIPTION_CHARS: usize = 4000;

/// Discord webhook message structure
#[derive(Debug, Serialize)]
struct DiscordMessage {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    footer: Option<DiscordFooter>,
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct DiscordFooter {
    text: String,
}

pub struct DiscordNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(webhook_url: &str, timeout: Duration) -> Option<Self> {
        if webhook_url.trim().is_empty() {
            return None;
        }
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to build Discord client: {}", e);
                return None;
            }
        };
        Some(Self {
            webhook_url: webhook_url.trim().to_string(),
            client,
        })
    }
}

fn color_for(title: &str) -> u32 {
    if title.starts_with(DEPEG_TAG) {
        0xFF0000 // Red
    } else if title.starts_with(ARB_TAG) {
        0x00FF00 // Green
    } else if title.starts_with(HEARTBEAT_TAG) {
        0x808080 // Gray
    } else {
        0xFFA500
    }
}

fn build_message(text: &str) -> DiscordMessage {
    let mut lines = text.lines();
    let title = lines.next().unwrap_or_default().trim().to_string();
    let mut description: String = lines.collect::<Vec<_>>().join("\n");
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        description = description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        description.push_str("\n…");
    }

    DiscordMessage {
        content: None,
        embeds: vec![DiscordEmbed {
            color: color_for(&title),
            title,
            description,
            footer: Some(DiscordFooter {
                text: "Stablecoin Depeg Monitor | Multi-Chain".to_string(),
            }),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }],
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, text: &str) -> bool {
        let message = build_message(text);
        match self.client.post(&self.webhook_url).json(&message).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Discord webhook returned status: {}", response.status());
                false
            }
            Err(e) => {
                error!("Failed to send Discord alert: {}", e.without_url());
                false
            }
        }
    }
}
